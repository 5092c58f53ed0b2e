use anyhow::Result;

use crate::opportunity::materializer::MaterializationReport;
use crate::opportunity::Opportunity;
use crate::pricing::PricedItem;

pub fn prices_to_csv(item: &PricedItem) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "description",
        "strategy",
        "unit_cost",
        "unit_price",
        "margin_pct",
        "quantity",
        "total_price",
    ])?;
    for price in item.pricing.prices() {
        writer.write_record([
            item.description.clone(),
            price.strategy.to_string().to_lowercase(),
            item.pricing.unit_cost.to_string(),
            price.unit_price.to_string(),
            price.margin_pct.to_string(),
            item.quantity.to_string(),
            item.total_price(price.strategy)?.to_string(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn opportunities_to_csv(opportunities: &[Opportunity]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record([
        "organization_id",
        "notice_id",
        "status",
        "match_score",
        "responsible",
        "justification",
        "analyzed_at",
        "created_at",
        "updated_at",
    ])?;
    for opp in opportunities {
        writer.write_record([
            opp.organization_id.clone(),
            opp.notice_id.clone(),
            opp.status.to_string(),
            format!("{:.4}", opp.match_score),
            opp.responsible.clone().unwrap_or_default(),
            opp.justification.clone().unwrap_or_default(),
            opp.analyzed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            opp.created_at.to_rfc3339(),
            opp.updated_at.to_rfc3339(),
        ])?;
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}

pub fn materialize_to_csv(reports: &[MaterializationReport]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["notice_id", "organization_id", "outcome", "score", "reason"])?;
    for report in reports {
        for outcome in &report.outcomes {
            let kind = if outcome.created { "created" } else { "updated" };
            writer.write_record([
                report.notice_id.clone(),
                outcome.organization_id.clone(),
                kind.to_string(),
                format!("{:.4}", outcome.score),
                String::new(),
            ])?;
        }
        for failure in &report.failures {
            writer.write_record([
                report.notice_id.clone(),
                failure.organization_id.clone(),
                "failed".to_string(),
                String::new(),
                failure.reason.clone(),
            ])?;
        }
    }
    let data = writer.into_inner()?;
    Ok(String::from_utf8_lossy(&data).to_string())
}
