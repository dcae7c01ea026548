use crate::output::{print_json, print_yaml};
use alert_core::AlertConfig;

pub fn run(config: &AlertConfig, json: bool) -> anyhow::Result<()> {
    if json {
        print_json(config)
    } else {
        print_yaml(config)
    }
}
