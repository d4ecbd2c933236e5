//! `rtl-depth signals`

use anyhow::{Context, Result};
use colored::Colorize;
use depth_core::rtl::ast::Direction;
use depth_core::rtl::{Design, ModuleNetlist};
use serde_json::json;
use std::path::Path;
use tabled::Tabled;

use super::read_rtl;
use crate::config::Settings;
use crate::output::{print_json, print_table, yes_no, OutputFormat};

#[derive(Tabled)]
struct SignalRow {
    #[tabled(rename = "Signal")]
    name: String,
    #[tabled(rename = "Width")]
    width: u32,
    #[tabled(rename = "Direction")]
    direction: String,
    #[tabled(rename = "Register")]
    register: String,
    #[tabled(rename = "Drivers")]
    drivers: usize,
}

#[derive(Tabled)]
struct InstanceRow {
    #[tabled(rename = "Instance")]
    name: String,
    #[tabled(rename = "Module")]
    module: String,
    #[tabled(rename = "Defined")]
    defined: String,
}

fn direction_name(direction: Option<Direction>) -> &'static str {
    match direction {
        Some(Direction::Input) => "input",
        Some(Direction::Output) => "output",
        Some(Direction::Inout) => "inout",
        None => "internal",
    }
}

fn signal_rows(module: &ModuleNetlist) -> Vec<SignalRow> {
    module
        .signals
        .values()
        .map(|s| SignalRow {
            name: s.name.clone(),
            width: s.width,
            direction: direction_name(s.direction).to_string(),
            register: yes_no(s.is_register),
            drivers: module.drivers_of(&s.name).len(),
        })
        .collect()
}

pub fn run(settings: &Settings, rtl: &Path) -> Result<()> {
    let source = read_rtl(rtl)?;
    let design = Design::from_source(&source)
        .with_context(|| format!("Failed to elaborate {}", rtl.display()))?;
    let top = design.top();
    let rows = signal_rows(top);
    let modules: Vec<&str> = design.modules().map(|m| m.name.as_str()).collect();

    match settings.format {
        OutputFormat::Json => {
            let signals: Vec<_> = rows
                .iter()
                .map(|r| {
                    json!({
                        "name": r.name,
                        "width": r.width,
                        "direction": r.direction,
                        "is_register": r.register == "yes",
                        "drivers": r.drivers,
                    })
                })
                .collect();
            let instances: Vec<_> = top
                .instances
                .iter()
                .map(|i| json!({ "name": i.name, "module": i.module, "defined": !i.black_box }))
                .collect();
            print_json(&json!({
                "top": design.top_name(),
                "modules": modules,
                "signals": signals,
                "instances": instances,
            }))?;
        }
        OutputFormat::Table => {
            println!("Top module: {}", design.top_name().cyan().bold());
            if modules.len() > 1 {
                println!("Modules:    {}", modules.join(", "));
            }
            print_table(&rows);
            if !top.instances.is_empty() {
                let instances: Vec<InstanceRow> = top
                    .instances
                    .iter()
                    .map(|i| InstanceRow {
                        name: i.name.clone(),
                        module: i.module.clone(),
                        defined: yes_no(!i.black_box),
                    })
                    .collect();
                print_table(&instances);
            }
        }
    }
    Ok(())
}
