use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::command_registry::{
    CommandSpec, GRAYSCALE_COMMAND, NO_ARG_COMMANDS, NUMERIC_CONTROL_COMMANDS, OPERATION_COMMAND,
    SINGLE_PATH_COMMANDS,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    pub action: String,
    pub raw: String,
    pub prompt: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl Intent {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            prompt: None,
            command_args: BTreeMap::new(),
        }
    }

    fn with_arg(mut self, key: &str, value: Value) -> Self {
        self.command_args.insert(key.to_string(), value);
        self
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn split_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> String {
    let parts = split_args(arg);
    match parts.len() {
        0 => String::new(),
        1 => parts[0].clone(),
        _ => parts.join(" "),
    }
}

/// Scalar from a command argument: JSON literal when it parses, string otherwise.
pub fn scalar_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if !value.is_object() && !value.is_array() => value,
        _ => Value::String(raw.to_string()),
    }
}

fn parse_toggle(arg: &str) -> Value {
    match arg.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "1" | "yes" => Value::Bool(true),
        "off" | "false" | "0" | "no" => Value::Bool(false),
        _ => Value::Null,
    }
}

/// `/op <name> [key=value ...] [reason="..."]`
fn parse_operation_args(arg: &str) -> (String, Map<String, Value>, String) {
    let mut parts = split_args(arg).into_iter();
    let name = parts.next().unwrap_or_default().to_ascii_lowercase();
    let mut params = Map::new();
    let mut reason = String::new();
    for part in parts {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        if key == "reason" {
            reason = value.to_string();
        } else {
            params.insert(key.to_string(), scalar_value(value.trim()));
        }
    }
    (name, params, reason)
}

pub fn parse_intent(text: &str) -> Intent {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Intent::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(control) = find_action(&command, NUMERIC_CONTROL_COMMANDS) {
                return Intent::new("adjust", text)
                    .with_arg("control", Value::String(control.to_string()))
                    .with_arg("value", scalar_value(arg));
            }

            if command == GRAYSCALE_COMMAND.command {
                return Intent::new("adjust", text)
                    .with_arg("control", Value::String(GRAYSCALE_COMMAND.action.to_string()))
                    .with_arg("value", parse_toggle(arg));
            }

            if let Some(action) = find_action(&command, SINGLE_PATH_COMMANDS) {
                return Intent::new(action, text)
                    .with_arg("path", Value::String(parse_single_path_arg(arg)));
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return Intent::new(action, text);
            }

            if command == OPERATION_COMMAND.command {
                let (name, params, reason) = parse_operation_args(arg);
                return Intent::new(OPERATION_COMMAND.action, text)
                    .with_arg("operation", Value::String(name))
                    .with_arg("params", Value::Object(params))
                    .with_arg("reason", Value::String(reason));
            }

            return Intent::new("unknown", text)
                .with_arg("command", Value::String(command))
                .with_arg("arg", Value::String(arg.to_string()));
        }
    }

    let mut intent = Intent::new("ask", text);
    intent.prompt = Some(raw_trimmed.to_string());
    intent
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_intent, scalar_value};

    #[test]
    fn scalar_values_parse_as_json_when_possible() {
        assert_eq!(scalar_value("5"), json!(5));
        assert_eq!(scalar_value("1.5"), json!(1.5));
        assert_eq!(scalar_value("true"), json!(true));
        assert_eq!(scalar_value("vertical"), json!("vertical"));
        assert_eq!(scalar_value("{\"a\":1}"), json!("{\"a\":1}"));
        assert_eq!(scalar_value("[1,2]"), json!("[1,2]"));
    }

    #[test]
    fn blank_input_is_noop() {
        assert_eq!(parse_intent("   ").action, "noop");
    }

    #[test]
    fn free_text_is_a_question() {
        let intent = parse_intent("  what should I fix?  ");
        assert_eq!(intent.action, "ask");
        assert_eq!(intent.prompt.as_deref(), Some("what should I fix?"));
    }

    #[test]
    fn parse_numeric_controls() {
        let brightness = parse_intent("/brightness -20");
        assert_eq!(brightness.action, "adjust");
        assert_eq!(brightness.command_args["control"], json!("brightness"));
        assert_eq!(brightness.command_args["value"], json!(-20));

        let rotate = parse_intent("/rotate 90");
        assert_eq!(rotate.command_args["control"], json!("rotation"));

        let contrast = parse_intent("/contrast 1.5");
        assert_eq!(contrast.command_args["value"], json!(1.5));

        let junk = parse_intent("/blur lots");
        assert_eq!(junk.command_args["value"], json!("lots"));
    }

    #[test]
    fn parse_grayscale_toggle() {
        assert_eq!(parse_intent("/grayscale on").command_args["value"], json!(true));
        assert_eq!(parse_intent("/grayscale off").command_args["value"], json!(false));
        assert_eq!(parse_intent("/grayscale").command_args["value"], json!(null));
    }

    #[test]
    fn parse_path_commands() {
        let load = parse_intent("/load \"/tmp/my photo.png\"");
        assert_eq!(load.action, "load_image");
        assert_eq!(load.command_args["path"], json!("/tmp/my photo.png"));

        let switch = parse_intent("/use cat.png");
        assert_eq!(switch.action, "switch_image");
        assert_eq!(switch.command_args["path"], json!("cat.png"));

        assert_eq!(parse_intent("/save s.json").action, "save_session");
        assert_eq!(parse_intent("/restore s.json").action, "restore_session");
        assert_eq!(parse_intent("/export out.png").action, "export_image");
    }

    #[test]
    fn parse_no_arg_commands() {
        assert_eq!(parse_intent("/flip_h").action, "flip_horizontal");
        assert_eq!(parse_intent("/flip_v").action, "flip_vertical");
        assert_eq!(parse_intent("/reset").action, "reset");
        assert_eq!(parse_intent("/images").action, "list_images");
        assert_eq!(parse_intent("/HELP").action, "help");
    }

    #[test]
    fn parse_operation_command() {
        let op = parse_intent("/op blur kernel=4 reason=\"soften noise\"");
        assert_eq!(op.action, "apply_operation");
        assert_eq!(op.command_args["operation"], json!("blur"));
        assert_eq!(op.command_args["params"], json!({"kernel": 4}));
        assert_eq!(op.command_args["reason"], json!("soften noise"));

        let flip = parse_intent("/op flip direction=vertical");
        assert_eq!(flip.command_args["params"], json!({"direction": "vertical"}));
    }

    #[test]
    fn parse_unknown_command() {
        let intent = parse_intent("/magic foo bar");
        assert_eq!(intent.action, "unknown");
        assert_eq!(intent.command_args["command"], json!("magic"));
        assert_eq!(intent.command_args["arg"], json!("foo bar"));
    }
}
