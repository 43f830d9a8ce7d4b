use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lumen_contracts::chat::{extract, parse_intent, scalar_value, CHAT_HELP_COMMANDS};
use lumen_contracts::events::EventWriter;
use lumen_contracts::session::{Adjustment, ControlParams, OperationRequest, Role};
use lumen_engine::codec;
use lumen_engine::filters::{apply_named, apply_pipeline};
use lumen_engine::model::{DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use lumen_engine::{model_for_name, ModelEvent, SessionController};
use serde_json::{Map, Value};

#[derive(Debug, Parser)]
#[command(
    name = "lumen",
    version,
    about = "Image editing controls with a vision-model assistant"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive session: load images, move controls, talk to the model.
    Chat(ChatArgs),
    /// Render one image through the control pipeline.
    Render(RenderArgs),
    /// Apply one named operation to an image.
    Apply(ApplyArgs),
    /// Print the operation requests embedded in model text, one JSON per line.
    Extract(ExtractArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    /// Image to load at startup.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Session file to restore at startup.
    #[arg(long)]
    session: Option<PathBuf>,
    /// Directory for operation previews and the default event log.
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,
}

#[derive(Debug, Parser)]
struct RenderArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    brightness: i32,
    #[arg(long, default_value_t = 1.0)]
    contrast: f64,
    #[arg(long, default_value_t = 0)]
    blur: u32,
    #[arg(long, default_value_t = 0.0)]
    sharpen: f64,
    #[arg(long, default_value_t = 0)]
    rotation: i32,
    #[arg(long)]
    grayscale: bool,
    #[arg(long = "flip-h")]
    flip_horizontal: bool,
    #[arg(long = "flip-v")]
    flip_vertical: bool,
}

#[derive(Debug, Parser)]
struct ApplyArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    operation: String,
    /// Operation parameter as key=value; repeatable.
    #[arg(long = "param")]
    params: Vec<String>,
    #[arg(long, default_value = "")]
    reason: String,
}

#[derive(Debug, Parser)]
struct ExtractArgs {
    /// Read from this file instead of stdin.
    #[arg(long)]
    file: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("lumen error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Render(args) => run_render(args),
        Command::Apply(args) => run_apply(args),
        Command::Extract(args) => run_extract(args),
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let events_path = args
        .events
        .clone()
        .or_else(|| args.out.as_ref().map(|out| out.join("events.jsonl")));
    let events = match events_path {
        Some(path) => EventWriter::new(path),
        None => EventWriter::disabled(),
    };
    let preview_dir = args.out.clone().unwrap_or_else(|| PathBuf::from("."));
    let mut controller =
        SessionController::new(model_for_name(&args.model, args.temperature), events);

    if let Some(session) = args.session.as_deref() {
        restore_session(&mut controller, session);
    }
    if let Some(image) = args.image.as_deref() {
        load_image(&mut controller, image);
    }

    let stdin = io::stdin();
    let mut line = String::new();
    println!(
        "Lumen chat started (model {}). Type /help for commands.",
        controller.model_name()
    );

    loop {
        while let Some(event) = controller.poll_model() {
            print_model_event(&event);
        }
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        let path_arg = value_as_non_empty_string(intent.command_args.get("path"));

        match intent.action.as_str() {
            "noop" => continue,
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            }
            "load_image" => match path_arg {
                Some(path) => load_image(&mut controller, Path::new(&path)),
                None => println!("/load requires a path"),
            },
            "list_images" => {
                let keys = controller.image_keys();
                if keys.is_empty() {
                    println!("No images loaded.");
                }
                for key in keys {
                    let marker = if controller.active_key() == Some(key.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!("{marker} {key}");
                }
            }
            "switch_image" => match path_arg {
                Some(key) => match controller.switch(&key) {
                    Ok(true) => {
                        println!("Switched to {key}.");
                        print!("{}", controller.params().describe());
                    }
                    Ok(false) => println!("No image named {key} in this session."),
                    Err(err) => println!("Error: {err}"),
                },
                None => println!("/use requires an image name"),
            },
            "adjust" => {
                let control = value_as_non_empty_string(intent.command_args.get("control"))
                    .unwrap_or_default();
                match adjustment_from_args(
                    &control,
                    intent.command_args.get("value"),
                    controller.params(),
                ) {
                    Ok(adjustment) => report(controller.adjust(adjustment), &controller),
                    Err(message) => println!("{message}"),
                }
            }
            "flip_horizontal" => {
                let result = controller.toggle_flip_horizontal();
                report(result, &controller);
            }
            "flip_vertical" => {
                let result = controller.toggle_flip_vertical();
                report(result, &controller);
            }
            "reset" => {
                let result = controller.reset();
                report(result, &controller);
            }
            "show_controls" => {
                print!("{}", controller.params().describe());
            }
            "analyze" => match controller.analyze() {
                Ok(()) => println!("Analyzing..."),
                Err(err) => println!("Error: {err}"),
            },
            "wait" => match controller.wait_model() {
                Some(event) => print_model_event(&event),
                None => println!("No model request in progress."),
            },
            "suggestions" => {
                let found = controller.suggestions();
                if found.is_empty() {
                    println!("The last reply contains no structured operations.");
                }
                for request in found {
                    println!("{}", serde_json::to_string(&request)?);
                }
            }
            "apply_operation" => {
                let request = operation_request_from_args(&intent.command_args);
                apply_operation(&mut controller, &request, &preview_dir);
            }
            "export_image" => match path_arg {
                Some(path) => match controller.export(Path::new(&path)) {
                    Ok(()) => println!("Exported {path}"),
                    Err(err) => println!("Error: {err}"),
                },
                None => println!("/export requires a path"),
            },
            "save_session" => match path_arg {
                Some(path) => match controller.save_session(Path::new(&path)) {
                    Ok(()) => println!("Session saved to {path}"),
                    Err(err) => println!("Error: {err}"),
                },
                None => println!("/save requires a path"),
            },
            "restore_session" => match path_arg {
                Some(path) => restore_session(&mut controller, Path::new(&path)),
                None => println!("/restore requires a path"),
            },
            "history" => {
                print_history(&controller);
            }
            "ask" => {
                let prompt = intent.prompt.clone().unwrap_or_default();
                match controller.ask(&prompt) {
                    Ok(()) => println!("Thinking..."),
                    Err(err) => println!("Error: {err}"),
                }
            }
            "unknown" => {
                let command = value_as_non_empty_string(intent.command_args.get("command"))
                    .unwrap_or_else(|| "unknown".to_string());
                println!("Unknown command: {command}");
            }
            _ => {}
        }
    }

    Ok(())
}

fn load_image(controller: &mut SessionController, path: &Path) {
    match controller.load(path) {
        Ok(outcome) => {
            if outcome.created {
                println!("Loaded {}.", outcome.key);
            } else {
                println!("Loaded {} (previous session state restored).", outcome.key);
                print!("{}", controller.params().describe());
            }
            if outcome.analysis_started {
                println!("Analyzing...");
            }
        }
        Err(err) => println!("Error: {err}"),
    }
}

fn restore_session(controller: &mut SessionController, path: &Path) {
    match controller.restore_session(path) {
        Ok(Some(key)) => {
            println!("Session restored; active image {key}.");
            print_history(controller);
        }
        Ok(None) => println!("Session restored; no active image."),
        Err(err) => println!("Could not restore session: {err}"),
    }
}

fn apply_operation(controller: &mut SessionController, request: &OperationRequest, dir: &Path) {
    let outcome = match controller.apply_named(request) {
        Ok(outcome) => outcome,
        Err(err) => {
            println!("Error: {err}");
            return;
        }
    };
    let Some(image) = outcome.image() else {
        println!("{}", outcome.message());
        return;
    };
    let stem = controller
        .active_key()
        .and_then(|key| Path::new(key).file_stem())
        .and_then(|stem| stem.to_str())
        .unwrap_or("image")
        .to_string();
    let preview = dir.join(format!("{stem}_{}.png", outcome.operation));
    match codec::write_image(image, &preview) {
        Ok(()) => println!("{} -> {}", outcome.message(), preview.display()),
        Err(err) => println!("Error: {err}"),
    }
}

fn report(result: lumen_engine::Result<()>, controller: &SessionController) {
    match result {
        Ok(()) => print!("{}", controller.params().describe()),
        Err(err) => println!("Error: {err}"),
    }
}

fn print_history(controller: &SessionController) {
    let history = controller.history();
    if history.is_empty() {
        println!("No messages for this image yet.");
    }
    for entry in history {
        let label = match entry.role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        println!("{label}: {}", entry.text);
    }
}

fn print_model_event(event: &ModelEvent) {
    match event {
        ModelEvent::Reply { key, text } => println!("\nAssistant [{key}]: {text}\n"),
        ModelEvent::Failed { key, message } => {
            println!("\nError [{key}]: could not get a reply: {message}\n")
        }
    }
}

fn adjustment_from_args(
    control: &str,
    value: Option<&Value>,
    current: &ControlParams,
) -> std::result::Result<Adjustment, String> {
    if control == "grayscale" {
        return Ok(match value {
            Some(Value::Bool(on)) => Adjustment::Grayscale(*on),
            _ => Adjustment::Grayscale(!current.grayscale),
        });
    }
    let Some(number) = value_as_f64(value) else {
        return Err(format!("/{control} requires a number"));
    };
    let adjustment = match control {
        "brightness" => Adjustment::Brightness(number.round() as i32),
        "contrast" => Adjustment::Contrast(number),
        "blur" => Adjustment::Blur(number.round().max(0.0) as u32),
        "sharpen" => Adjustment::Sharpen(number),
        "rotation" => Adjustment::Rotation(number.round() as i32),
        other => return Err(format!("Unknown control: {other}")),
    };
    Ok(adjustment)
}

fn operation_request_from_args(args: &std::collections::BTreeMap<String, Value>) -> OperationRequest {
    let mut request = OperationRequest::new(
        value_as_non_empty_string(args.get("operation")).unwrap_or_default(),
    );
    if let Some(Value::Object(params)) = args.get("params") {
        request.params = params.clone();
    }
    if let Some(reason) = value_as_non_empty_string(args.get("reason")) {
        request.reason = reason;
    }
    request
}

fn run_render(args: RenderArgs) -> Result<i32> {
    let bytes =
        fs::read(&args.input).with_context(|| format!("failed reading {}", args.input.display()))?;
    let source = codec::decode(&bytes)?;
    let mut params = ControlParams::default();
    for adjustment in [
        Adjustment::Brightness(args.brightness),
        Adjustment::Contrast(args.contrast),
        Adjustment::Blur(args.blur),
        Adjustment::Sharpen(args.sharpen),
        Adjustment::Rotation(args.rotation),
        Adjustment::Grayscale(args.grayscale),
        Adjustment::FlipHorizontal(args.flip_horizontal),
        Adjustment::FlipVertical(args.flip_vertical),
    ] {
        params.apply(adjustment);
    }
    let derived = apply_pipeline(&source, &params);
    codec::write_image(&derived, &args.out)?;
    print!("{}", params.describe());
    println!("Wrote {}", args.out.display());
    Ok(0)
}

fn run_apply(args: ApplyArgs) -> Result<i32> {
    let bytes =
        fs::read(&args.input).with_context(|| format!("failed reading {}", args.input.display()))?;
    let source = codec::decode(&bytes)?;
    let mut params = Map::new();
    for raw in &args.params {
        let Some((key, value)) = raw.split_once('=') else {
            bail!("--param expects key=value, got {raw}");
        };
        params.insert(key.trim().to_string(), scalar_value(value.trim()));
    }
    let mut request = OperationRequest::new(args.operation.clone()).with_reason(args.reason.clone());
    request.params = params;

    let outcome = apply_named(&source, &request);
    let Some(image) = outcome.image() else {
        eprintln!("{}", outcome.message());
        return Ok(1);
    };
    codec::write_image(image, &args.out)?;
    println!("{} -> {}", outcome.message(), args.out.display());
    Ok(0)
}

fn run_extract(args: ExtractArgs) -> Result<i32> {
    let text = match args.file.as_deref() {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    for request in extract(&text) {
        println!("{}", serde_json::to_string(&request)?);
    }
    Ok(0)
}

fn value_as_f64(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(|row| match row {
            Value::Number(num) => num.as_f64(),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|number| number.is_finite())
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use lumen_contracts::chat::parse_intent;
    use lumen_contracts::session::{Adjustment, ControlParams};
    use serde_json::json;

    use super::{adjustment_from_args, operation_request_from_args};

    #[test]
    fn numeric_controls_map_to_adjustments() {
        let params = ControlParams::default();
        let intent = parse_intent("/brightness -20");
        let adjustment = adjustment_from_args(
            "brightness",
            intent.command_args.get("value"),
            &params,
        );
        assert_eq!(adjustment, Ok(Adjustment::Brightness(-20)));
        assert_eq!(
            adjustment_from_args("blur", Some(&json!("3")), &params),
            Ok(Adjustment::Blur(3))
        );
        assert!(adjustment_from_args("blur", Some(&json!("lots")), &params).is_err());
    }

    #[test]
    fn grayscale_without_value_toggles() {
        let mut params = ControlParams::default();
        assert_eq!(
            adjustment_from_args("grayscale", Some(&json!(null)), &params),
            Ok(Adjustment::Grayscale(true))
        );
        params.apply(Adjustment::Grayscale(true));
        assert_eq!(
            adjustment_from_args("grayscale", None, &params),
            Ok(Adjustment::Grayscale(false))
        );
        assert_eq!(
            adjustment_from_args("grayscale", Some(&json!(true)), &params),
            Ok(Adjustment::Grayscale(true))
        );
    }

    #[test]
    fn op_command_becomes_request() {
        let intent = parse_intent("/op sharpen amount=2 reason=\"crisper\"");
        let request = operation_request_from_args(&intent.command_args);
        assert_eq!(request.operation, "sharpen");
        assert_eq!(request.params.get("amount"), Some(&json!(2)));
        assert_eq!(request.reason, "crisper");

        let empty = operation_request_from_args(&BTreeMap::new());
        assert!(empty.operation.is_empty());
    }
}
