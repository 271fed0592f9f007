//! Terminal output for the dashboard, service status and upload reports.

use chrono::Local;
use console::style;
use fightwatch_api_models::FeatureStatus;
use fightwatch_incident_models::{Incident, IncidentSource, SourceFilter};
use fightwatch_monitor::{Dashboard, MonitorOverview};
use fightwatch_sampler::upload::UploadReport;

/// Prints service health and the feature catalog.
pub fn overview(overview: &MonitorOverview) {
    println!(
        "Service: {} (version {})",
        style(&overview.service.status).bold(),
        if overview.service.version.is_empty() {
            "unknown"
        } else {
            overview.service.version.as_str()
        }
    );
    println!(
        "Model:   {}",
        if overview.model_loaded {
            style("loaded").green()
        } else {
            style("not loaded").yellow()
        }
    );
    if overview.is_degraded() {
        println!(
            "{}",
            style("Models are not loaded; detection features are limited.").yellow()
        );
    }
    println!();

    if overview.features.0.is_empty() {
        println!("No features reported.");
        return;
    }

    for (key, feature) in overview.features.iter() {
        let status = match feature.status {
            FeatureStatus::Active => style(feature.status.to_string()).green(),
            FeatureStatus::Limited => style(feature.status.to_string()).yellow(),
            FeatureStatus::Inactive | FeatureStatus::Unknown => {
                style(feature.status.to_string()).red()
            }
        };
        println!("{:<10} {:<20} {status}", key, feature.name);
        if !feature.description.is_empty() {
            println!("{:<10} {}", "", style(&feature.description).dim());
        }
        if !feature.capabilities.is_empty() {
            println!("{:<10} {}", "", feature.capabilities.join(", "));
        }
    }
}

/// Prints the summary cards and the incident list.
pub fn dashboard(dashboard: &Dashboard) {
    let stats = &dashboard.stats;

    println!("{}", style("Incident dashboard").bold().underlined());
    println!();
    println!("  Total incidents     {}", style(stats.total).bold());
    println!("  Active monitors     {}", stats.active_sources());
    println!(
        "  Average confidence  {:.1}%",
        stats.average_confidence * 100.0
    );
    let trend = format!("{:+.1}%", stats.trend_percent);
    println!(
        "  24h trend           {}",
        if stats.trend_percent > 0.0 {
            style(trend).red()
        } else {
            style(trend).green()
        }
    );
    println!();

    for source in IncidentSource::all() {
        println!("  {:<18}  {}", source.label(), stats.count_for(*source));
    }
    println!();

    let heading = match dashboard.filter {
        SourceFilter::All => "All incidents".to_string(),
        SourceFilter::Only(source) => format!("{} incidents", source.label()),
    };
    println!("{}", style(heading).bold());

    if dashboard.incidents.is_empty() {
        println!("  No incidents recorded.");
        return;
    }

    println!(
        "  {:<15} {:<20} {:<8} {:<8} {:>6}  DETAILS",
        "ID", "TIME", "SOURCE", "KIND", "CONF"
    );
    for incident in dashboard.incidents.iter().rev() {
        incident_row(incident);
    }
}

fn incident_row(incident: &Incident) {
    let time = incident
        .timestamp
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S");
    let details = incident
        .camera_id
        .as_deref()
        .or(incident.source_url.as_deref())
        .unwrap_or("");
    println!(
        "  {:<15} {:<20} {:<8} {:<8} {:>5.1}%  {details}",
        incident.id.to_string(),
        time.to_string(),
        incident.source.to_string(),
        incident.kind,
        incident.confidence * 100.0
    );
}

/// Prints the outcome of one upload analysis.
pub fn upload_report(report: &UploadReport) {
    println!(
        "{}: {} prediction(s), peak fight probability {:.1}%{}",
        report.path.display(),
        report.analysis.predictions.len(),
        report.peak_probability * 100.0,
        report
            .peak
            .as_ref()
            .map(|p| format!(" at {:.1}s", p.timestamp))
            .unwrap_or_default()
    );
    match &report.incident {
        Some(incident) => println!(
            "{}",
            style(format!(
                "Incident: {} ({:.1}% confidence)",
                incident.kind,
                incident.confidence * 100.0
            ))
            .red()
            .bold()
        ),
        None => println!("{}", style("No incident detected.").green()),
    }
}
