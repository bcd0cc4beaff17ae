//! Command execution.

use crate::config::{Config, ConfigError, OutputFormat};
use crate::Commands;
use colored::Colorize;
use serde_json::{json, Value};
use statehold_core::{
    interface, validate_name_lax, validate_name_strict, ActionResponse, Address, Engine, Host, Id,
    Machine, MachineDocument,
};
use std::path::Path;
use std::sync::Arc;

/// Executes a command and returns the formatted output.
pub fn execute(config: &Config, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Id { names } => Ok(ids(config, &names)),
        Commands::Validate { file } => validate(config, &file),
        Commands::Simulate {
            file,
            user,
            actions,
        } => simulate(config, &file, user, &actions),
        Commands::Interfaces => Ok(interfaces(config)),
    }
}

/// Reads a definition document; `.yaml`/`.yml` files are YAML, anything
/// else JSON.
pub fn load_document(config: &Config, file: &Path) -> Result<MachineDocument, ConfigError> {
    let path = config.definition_path(file);
    let content =
        std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError(path.clone(), e))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let parsed = if is_yaml {
        serde_yaml::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| ConfigError::ParseError(path, e))
}

fn load_machine(config: &Config, file: &Path) -> Result<Machine, Box<dyn std::error::Error>> {
    let document = load_document(config, file)?;
    let machine = document
        .into_machine(config.default_operator())
        .map_err(core_error)?;
    Ok(machine)
}

fn core_error(e: statehold_core::CoreError) -> String {
    format!("{} ({})", e, e.error_code())
}

fn ids(config: &Config, names: &[String]) -> String {
    let rows: Vec<(String, Id, bool, bool)> = names
        .iter()
        .map(|name| {
            (
                name.clone(),
                Id::derive(name),
                validate_name_strict(name),
                validate_name_lax(name),
            )
        })
        .collect();

    if config.output == OutputFormat::Json {
        let items: Vec<Value> = rows
            .iter()
            .map(|(name, id, strict, lax)| {
                json!({ "name": name, "id": id, "strict": strict, "lax": lax })
            })
            .collect();
        return format_json(&Value::Array(items));
    }

    rows.iter()
        .map(|(name, id, strict, lax)| {
            format!(
                "{}  {}  strict:{} lax:{}",
                id.to_string().yellow(),
                name.cyan(),
                yes_no(*strict),
                yes_no(*lax)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn validate(config: &Config, file: &Path) -> Result<String, Box<dyn std::error::Error>> {
    let machine = load_machine(config, file)?;
    let transitions: usize = machine.states.iter().map(|s| s.transitions.len()).sum();

    if config.output == OutputFormat::Json {
        return Ok(format_json(&machine.to_json()?));
    }

    let mut output = format!(
        "{} machine {} ({})\n",
        "Valid".green(),
        machine.name.cyan(),
        machine.id
    );
    output.push_str(&format!("  operator: {}\n", machine.operator));
    if let Some(initial) = machine.initial_state() {
        output.push_str(&format!("  initial:  {}\n", initial.name));
    }
    output.push_str(&format!(
        "  {} states, {} transitions",
        machine.states.len(),
        transitions
    ));
    for state in &machine.states {
        let mut flags = Vec::new();
        if state.enter_guarded {
            flags.push("enter");
        }
        if state.exit_guarded {
            flags.push("exit");
        }
        let guards = if flags.is_empty() {
            String::new()
        } else {
            format!(" [guarded: {}]", flags.join(", "))
        };
        output.push_str(&format!("\n  {} {}{}", state.id, state.name, guards));
        for transition in &state.transitions {
            output.push_str(&format!(
                "\n    {} -> {}",
                transition.action_name, transition.target_state_name
            ));
        }
    }
    Ok(output)
}

fn simulate(
    config: &Config,
    file: &Path,
    user: Address,
    actions: &[String],
) -> Result<String, Box<dyn std::error::Error>> {
    let machine = load_machine(config, file)?;
    let (machine_id, operator) = (machine.id, machine.operator);

    let engine = Engine::deploy(Arc::new(Host::new()), config.owner).map_err(core_error)?;
    engine
        .install_machine(config.owner, machine)
        .map_err(core_error)?;

    let mut responses: Vec<ActionResponse> = Vec::with_capacity(actions.len());
    for action in actions {
        let response = engine
            .invoke_action(operator, user, machine_id, Id::derive(action))
            .map_err(|e| format!("action '{}' failed: {}", action, core_error(e)))?;
        tracing::debug!("simulated '{}'", action);
        responses.push(response);
    }

    let history = engine.get_position_history(user);
    let last = engine.get_last_position(user);

    if config.output == OutputFormat::Json {
        return Ok(format_json(&json!({
            "user": user,
            "responses": responses,
            "history": history,
            "last": last,
        })));
    }

    let mut output = String::new();
    for response in &responses {
        output.push_str(&format!(
            "{} {} -> {} via '{}'\n",
            response.machine_name.cyan(),
            response.prior_state_name,
            response.next_state_name.green(),
            response.action_name
        ));
        if !response.exit_message.is_empty() {
            output.push_str(&format!("  exit:  {}\n", response.exit_message));
        }
        if !response.enter_message.is_empty() {
            output.push_str(&format!("  enter: {}\n", response.enter_message));
        }
    }
    match last {
        Some(last) => output.push_str(&format!(
            "{} {} after {} moves ({} history entries)",
            "Final state".bold(),
            last.position.state_id,
            last.sequence,
            history.len()
        )),
        None => output.push_str(&"No actions invoked".yellow().to_string()),
    }
    Ok(output)
}

fn interfaces(config: &Config) -> String {
    if config.output == OutputFormat::Json {
        let map: serde_json::Map<String, Value> = interface::ALL
            .iter()
            .map(|(name, id)| (name.to_string(), json!(id)))
            .collect();
        return format_json(&Value::Object(map));
    }

    interface::ALL
        .iter()
        .map(|(name, id)| format!("{}  {}", id.to_string().yellow(), name))
        .collect::<Vec<_>>()
        .join("\n")
}

fn yes_no(ok: bool) -> String {
    if ok {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    }
}

fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
