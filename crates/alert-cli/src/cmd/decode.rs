use crate::output::print_json;
use alert_core::{AlertConfig, AlertDecoder, Notification};
use anyhow::Context;
use std::path::Path;

pub fn run(config: &AlertConfig, file: &Path, json: bool) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    // YAML is a superset of JSON, so one parser covers both.
    let notification: Notification = serde_yaml::from_str(&data)
        .with_context(|| format!("{} is not a notification", file.display()))?;

    let decoder = AlertDecoder::new(config.schema()?)?;
    let record = decoder
        .decode(&notification)
        .context("notification does not match the alert schema")?;

    if json {
        print_json(&record)?;
    } else {
        println!("application: {}", record.application_name);
        println!("description: {}", record.description);
        println!("tts:         {}", record.tts_alert);
        println!("email:       {}", record.email_alert);
    }
    Ok(())
}
