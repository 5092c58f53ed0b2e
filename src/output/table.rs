use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};

use crate::matching::MatchScore;
use crate::opportunity::materializer::MaterializationReport;
use crate::opportunity::refresh::RefreshReport;
use crate::opportunity::{BatchFailure, Opportunity, OpportunityStatus};
use crate::pricing::{PricedItem, Strategy};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn render_price_table(item: &PricedItem) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Strategy",
        "Unit Price",
        "Margin %",
        "Total",
    ]);
    for price in item.pricing.prices() {
        let strategy_cell = match price.strategy {
            Strategy::Competitive => Cell::new(price.strategy.to_string()).fg(Color::Yellow),
            Strategy::Moderate => Cell::new(price.strategy.to_string()).fg(Color::Green),
            Strategy::Conservative => Cell::new(price.strategy.to_string()).fg(Color::Cyan),
        };
        table.add_row(Row::from(vec![
            strategy_cell,
            Cell::new(price.unit_price.to_string()),
            Cell::new(price.margin_pct.to_string()),
            Cell::new(
                item.total_price(price.strategy)
                    .map_or_else(|_| "overflow".to_string(), |total| total.to_string()),
            ),
        ]));
    }
    format!(
        "{} ({} {}), unit cost {}, markup {}%\n{}",
        item.description,
        item.quantity,
        item.unit,
        item.pricing.unit_cost,
        item.pricing.suggested_markup_pct,
        table
    )
}

pub fn render_score_table(notice_id: &str, organization_id: &str, result: &MatchScore) -> String {
    let mut table = new_table();
    table.set_header(vec!["Signal", "Score"]);
    let c = &result.components;
    for (name, value) in [
        ("sector", c.sector),
        ("location", c.location),
        ("keyword", c.keyword),
        ("value", c.value),
    ] {
        table.add_row(vec![name.to_string(), format!("{value:.3}")]);
    }
    table.add_row(Row::from(vec![
        Cell::new("relevance"),
        Cell::new(format!("{:.3}", result.score)).fg(Color::Green),
    ]));
    format!("{notice_id} for {organization_id}\n{table}")
}

pub fn render_opportunities_table(opportunities: &[Opportunity]) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Organization",
        "Notice",
        "Status",
        "Score",
        "Responsible",
        "Analyzed",
        "Updated",
    ]);
    for opp in opportunities {
        let status_cell = match opp.status {
            OpportunityStatus::Won => Cell::new(opp.status.to_string()).fg(Color::Green),
            OpportunityStatus::Lost | OpportunityStatus::Canceled => {
                Cell::new(opp.status.to_string()).fg(Color::Red)
            }
            _ => Cell::new(opp.status.to_string()),
        };
        table.add_row(Row::from(vec![
            Cell::new(&opp.organization_id),
            Cell::new(&opp.notice_id),
            status_cell,
            Cell::new(format!("{:.3}", opp.match_score)),
            Cell::new(opp.responsible.as_deref().unwrap_or("-")),
            Cell::new(
                opp.analyzed_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
            Cell::new(opp.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]));
    }
    table.to_string()
}

pub fn render_materialize_table(reports: &[MaterializationReport]) -> String {
    let mut table = new_table();
    table.set_header(vec![
        "Notice",
        "Matched",
        "Created",
        "Below Threshold",
        "Skipped",
        "Failures",
    ]);
    let mut failures = Vec::new();
    for report in reports {
        let failure_cell = if report.failures.is_empty() {
            Cell::new("0")
        } else {
            Cell::new(report.failures.len()).fg(Color::Red)
        };
        table.add_row(Row::from(vec![
            Cell::new(&report.notice_id),
            Cell::new(report.success_count()),
            Cell::new(report.created_count()),
            Cell::new(report.below_threshold),
            Cell::new(report.skipped_inactive),
            failure_cell,
        ]));
        failures.extend(report.failures.iter());
    }
    with_failures(table, &failures)
}

pub fn render_refresh_table(report: &RefreshReport) -> String {
    let mut table = new_table();
    table.set_header(vec!["Organization", "Notice", "Previous", "Score", "Delta"]);
    for refreshed in &report.refreshed {
        let delta = refreshed.score - refreshed.previous;
        let delta_cell = if delta < 0.0 {
            Cell::new(format!("{delta:+.3}")).fg(Color::Red)
        } else {
            Cell::new(format!("{delta:+.3}")).fg(Color::Green)
        };
        table.add_row(Row::from(vec![
            Cell::new(&refreshed.key.organization_id),
            Cell::new(&refreshed.key.notice_id),
            Cell::new(format!("{:.3}", refreshed.previous)),
            Cell::new(format!("{:.3}", refreshed.score)),
            delta_cell,
        ]));
    }
    let failures = report.failures.iter().collect::<Vec<_>>();
    with_failures(table, &failures)
}

fn with_failures(table: Table, failures: &[&BatchFailure]) -> String {
    if failures.is_empty() {
        return table.to_string();
    }
    let mut failed = new_table();
    failed.set_header(vec!["Organization", "Notice", "Reason"]);
    for failure in failures {
        failed.add_row(vec![
            failure.organization_id.clone(),
            failure.notice_id.clone(),
            failure.reason.clone(),
        ]);
    }
    format!("{table}\nFailures:\n{failed}")
}
