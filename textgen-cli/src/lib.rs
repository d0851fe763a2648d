//! # Textgen CLI
//!
//! Startup for the `textgen` binary: settings, model selection and loading,
//! then either the HTTP server or a single generation on stdout.

pub mod cli;

pub use cli::{Cli, Commands};

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use textgen::extensions::ExtensionRegistry;
use textgen::generation::{generate_reply, GeneratorConfig};
use textgen::generation_backend::RecordedModelLoader;
use textgen::model::ModelManager;
use textgen::resources::ResourceDirs;
use textgen::server::{self, AppState};
use textgen::settings::Settings;
use textgen::types::{GenerationRequest, InteractionMode, ModelError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Settings file picked up from the data directory when `--settings` is absent.
pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";

/// The settings file to load, if any.
pub fn settings_path(cli: &Cli) -> Option<PathBuf> {
    match &cli.settings {
        Some(path) => Some(path.clone()),
        None => {
            let path = cli.root.join(DEFAULT_SETTINGS_FILE);
            path.is_file().then_some(path)
        }
    }
}

/// Ask the user to pick one of `models` by number.
pub fn choose_model<R: BufRead, W: Write>(
    models: &[String],
    input: &mut R,
    output: &mut W,
) -> Result<String> {
    writeln!(output, "The following models are available:\n")?;
    for (i, model) in models.iter().enumerate() {
        writeln!(output, "{}. {}", i + 1, model)?;
    }

    loop {
        write!(output, "\nWhich one do you want to load? 1-{}\n\n", models.len())?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            bail!("no model was chosen");
        }
        match line.trim().parse::<usize>() {
            Ok(choice) if (1..=models.len()).contains(&choice) => {
                return Ok(models[choice - 1].clone())
            }
            _ => writeln!(output, "Please enter a number between 1 and {}.", models.len())?,
        }
    }
}

/// The model named on the command line, the only available one, or the
/// user's choice among several.
pub fn select_model<R: BufRead, W: Write>(
    requested: Option<&str>,
    dirs: &ResourceDirs,
    input: &mut R,
    output: &mut W,
) -> Result<String> {
    if let Some(name) = requested {
        return Ok(name.to_string());
    }
    let available = dirs.available_models();
    match available.as_slice() {
        [] => Err(ModelError::NoModelsAvailable.into()),
        [only] => Ok(only.clone()),
        _ => choose_model(&available, input, output),
    }
}

/// Write each transcript's new text to `output`.
///
/// When a transcript does not extend the previous one (an output transform
/// rewrote it), it is printed again in full on a new line.
pub fn print_transcripts<I, W>(transcripts: I, output: &mut W) -> Result<String>
where
    I: IntoIterator<Item = Result<String, textgen::types::GenerationError>>,
    W: Write,
{
    let mut printed = String::new();
    for transcript in transcripts {
        let transcript = transcript?;
        match transcript.strip_prefix(printed.as_str()) {
            Some(rest) => write!(output, "{}", rest)?,
            None => write!(output, "\n{}", transcript)?,
        }
        output.flush()?;
        printed = transcript;
    }
    writeln!(output)?;
    Ok(printed)
}

async fn generate_to_stdout(
    models: Arc<ModelManager>,
    extensions: ExtensionRegistry,
    config: GeneratorConfig,
    request: GenerationRequest,
) -> Result<()> {
    let model = models.acquire().await?;
    tokio::task::spawn_blocking(move || -> Result<()> {
        let stream = generate_reply(
            model.adapter.as_ref(),
            &extensions,
            &config,
            request,
            CancellationToken::new(),
        )?;
        print_transcripts(stream, &mut std::io::stdout().lock())?;
        Ok(())
    })
    .await
    .context("generation task failed")?
}

/// Run the command line.
pub async fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(settings_path(&cli).as_deref())?;
    let dirs = ResourceDirs::new(&cli.root);

    let model_name = select_model(
        cli.model.as_deref(),
        &dirs,
        &mut std::io::stdin().lock(),
        &mut std::io::stdout(),
    )?;

    let models = Arc::new(ModelManager::new(
        Arc::new(RecordedModelLoader::new(dirs.models())),
        cli.load_options(),
        None,
        dirs.torch_dumps(),
    ));
    models
        .load(&model_name)
        .await
        .with_context(|| format!("failed to load {}", model_name))?;

    let extensions = ExtensionRegistry::from_names(&cli.extensions, settings.extension_overrides());
    let generator = GeneratorConfig::new(cli.mode(), cli.no_stream).with_verbose(cli.verbose);

    match cli.command() {
        Commands::Serve => {
            if cli.share {
                warn!("--share is not supported; the server is only reachable on its listen address");
            }
            let state = AppState::new(models, settings, dirs, extensions, generator);
            server::serve(state, cli.listen_addr()).await?;
        }
        Commands::Generate {
            prompt,
            max_new_tokens,
        } => {
            let prompt = prompt.unwrap_or_else(|| settings.default_prompt_for_model(&model_name));
            let max_new_tokens =
                settings.clamp_max_new_tokens(max_new_tokens.unwrap_or(settings.max_new_tokens));
            let decoding = match textgen::preset::load_preset(&dirs.presets(), &settings.preset) {
                Ok(decoding) => decoding,
                Err(e) => {
                    warn!("Using default decoding parameters: {}", e);
                    Default::default()
                }
            };
            info!("Generating up to {} tokens", max_new_tokens);
            let request = GenerationRequest::new(prompt, max_new_tokens).with_decoding(decoding);
            let config = GeneratorConfig {
                mode: InteractionMode::Default,
                ..generator
            };
            generate_to_stdout(models, extensions, config, request).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn models() -> Vec<String> {
        vec!["opt-1.3b".to_string(), "pygmalion-6b".to_string()]
    }

    #[test]
    fn test_choose_model_retries_until_valid() {
        let mut input = Cursor::new("7\nabc\n2\n");
        let mut output = Vec::new();
        let chosen = choose_model(&models(), &mut input, &mut output).unwrap();
        assert_eq!(chosen, "pygmalion-6b");

        let shown = String::from_utf8(output).unwrap();
        assert!(shown.contains("1. opt-1.3b\n2. pygmalion-6b"));
        assert_eq!(shown.matches("Please enter a number").count(), 2);
    }

    #[test]
    fn test_choose_model_fails_on_eof() {
        let mut output = Vec::new();
        assert!(choose_model(&models(), &mut Cursor::new(""), &mut output).is_err());
    }

    #[test]
    fn test_select_model() {
        let root = TempDir::new().unwrap();
        let dirs = ResourceDirs::new(root.path());
        let mut output = Vec::new();

        let err = select_model(None, &dirs, &mut Cursor::new(""), &mut output).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ModelError>(),
            Some(ModelError::NoModelsAvailable)
        ));

        std::fs::create_dir_all(dirs.models().join("opt-1.3b")).unwrap();
        assert_eq!(
            select_model(None, &dirs, &mut Cursor::new(""), &mut output).unwrap(),
            "opt-1.3b"
        );
        assert_eq!(
            select_model(Some("other"), &dirs, &mut Cursor::new(""), &mut output).unwrap(),
            "other"
        );
    }

    #[test]
    fn test_print_transcripts_writes_increments() {
        let transcripts = ["Hello", "Hello wor", "Hello world", "HELLO WORLD"]
            .map(|t| Ok(t.to_string()));
        let mut output = Vec::new();
        let last = print_transcripts(transcripts, &mut output).unwrap();
        assert_eq!(last, "HELLO WORLD");
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Hello world\nHELLO WORLD\n"
        );
    }

    #[test]
    fn test_settings_path_prefers_flag_then_root_file() {
        let root = TempDir::new().unwrap();
        let root_arg = root.path().to_string_lossy().into_owned();
        let cli = Cli::parse_from(["textgen", "--root", root_arg.as_str()]);
        assert_eq!(settings_path(&cli), None);

        std::fs::write(root.path().join(DEFAULT_SETTINGS_FILE), "{}").unwrap();
        assert_eq!(
            settings_path(&cli),
            Some(root.path().join(DEFAULT_SETTINGS_FILE))
        );

        let cli = Cli::parse_from(["textgen", "--settings", "custom.json"]);
        assert_eq!(settings_path(&cli), Some(PathBuf::from("custom.json")));
    }
}
