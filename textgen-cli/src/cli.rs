//! Command-line definition for the `textgen` binary.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use textgen::model::LoadOptions;
use textgen::server::DEFAULT_PORT;
use textgen::types::InteractionMode;

/// Text generation front end for local causal language models.
#[derive(Parser, Debug)]
#[command(name = "textgen")]
#[command(version)]
#[command(about = "Text generation front end for local causal language models")]
pub struct Cli {
    /// Name of the model to load by default
    #[arg(long)]
    pub model: Option<String>,

    /// Launch in notebook mode, where the output is written to the same text box as the input
    #[arg(long, conflicts_with = "chat")]
    pub notebook: bool,

    /// Launch in chat mode
    #[arg(long)]
    pub chat: bool,

    /// Use the CPU to generate text
    #[arg(long)]
    pub cpu: bool,

    /// Load the model with 8-bit precision
    #[arg(long)]
    pub load_in_8bit: bool,

    /// Load the model with bfloat16 precision. Requires an NVIDIA Ampere GPU
    #[arg(long)]
    pub bf16: bool,

    /// Automatically split the model across the available GPU(s) and CPU
    #[arg(long)]
    pub auto_devices: bool,

    /// If the model is too large for your GPU(s) and CPU combined, send the remaining layers to the disk
    #[arg(long)]
    pub disk: bool,

    /// Directory to save the disk cache to. Defaults to "cache/"
    #[arg(long, value_name = "DIR")]
    pub disk_cache_dir: Option<PathBuf>,

    /// Maximum GPU memory in GiB to allocate
    #[arg(long, value_name = "GIB")]
    pub gpu_memory: Option<u32>,

    /// Maximum CPU memory in GiB to allocate for offloaded weights. Defaults to 99
    #[arg(long, value_name = "GIB")]
    pub cpu_memory: Option<u32>,

    /// Enable the use of DeepSpeed ZeRO-3 for inference
    #[arg(long)]
    pub deepspeed: bool,

    /// DeepSpeed: directory to use for ZeRO-3 NVMe offloading
    #[arg(long, value_name = "DIR")]
    pub nvme_offload_dir: Option<PathBuf>,

    /// DeepSpeed: optional argument for distributed setups
    #[arg(long, default_value_t = 0)]
    pub local_rank: u32,

    /// Don't stream the text output in real time. Improves the text generation performance
    #[arg(long)]
    pub no_stream: bool,

    /// Load the default interface settings from this JSON file
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// The list of extensions to load
    #[arg(long, num_args = 1.., value_name = "NAME")]
    pub extensions: Vec<String>,

    /// Make the server reachable from your local network
    #[arg(long)]
    pub listen: bool,

    /// The listening port that the server will use
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub listen_port: u16,

    /// Create a public URL (not supported; the server stays local)
    #[arg(long)]
    pub share: bool,

    /// Print the prompts to the terminal
    #[arg(long)]
    pub verbose: bool,

    /// Data directory holding models/, presets/, characters/ and logs/
    #[arg(long, default_value = ".", value_name = "DIR")]
    pub root: PathBuf,

    /// Enable debug output to stderr
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Serve the HTTP API (default)
    Serve,
    /// Complete one prompt in default mode and stream it to stdout
    Generate {
        /// Prompt text; defaults to the model's default prompt
        prompt: Option<String>,

        /// Maximum number of tokens to generate
        #[arg(long)]
        max_new_tokens: Option<usize>,
    },
}

impl Cli {
    pub fn mode(&self) -> InteractionMode {
        if self.chat {
            InteractionMode::Chat
        } else if self.notebook {
            InteractionMode::Notebook
        } else {
            InteractionMode::Default
        }
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            cpu: self.cpu,
            load_in_8bit: self.load_in_8bit,
            bf16: self.bf16,
            auto_devices: self.auto_devices,
            disk: self.disk,
            disk_cache_dir: self.disk_cache_dir.clone(),
            gpu_memory: self.gpu_memory,
            cpu_memory: self.cpu_memory,
            deepspeed: self.deepspeed,
            nvme_offload_dir: self.nvme_offload_dir.clone(),
            local_rank: self.local_rank,
        }
    }

    pub fn listen_addr(&self) -> SocketAddr {
        let ip = if self.listen {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        };
        SocketAddr::new(ip, self.listen_port)
    }

    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("textgen").chain(args.iter().copied())).unwrap()
    }

    #[rstest]
    #[case(&[], InteractionMode::Default)]
    #[case(&["--notebook"], InteractionMode::Notebook)]
    #[case(&["--chat"], InteractionMode::Chat)]
    fn test_mode_flags(#[case] args: &[&str], #[case] expected: InteractionMode) {
        assert_eq!(parse(args).mode(), expected);
    }

    #[test]
    fn test_notebook_conflicts_with_chat() {
        assert!(Cli::try_parse_from(["textgen", "--notebook", "--chat"]).is_err());
    }

    #[test]
    fn test_load_options_mapping() {
        let cli = parse(&[
            "--load-in-8bit",
            "--gpu-memory",
            "10",
            "--disk",
            "--disk-cache-dir",
            "offload",
            "--local-rank",
            "2",
        ]);
        let options = cli.load_options();
        assert!(options.load_in_8bit && options.disk);
        assert_eq!(options.gpu_memory, Some(10));
        assert_eq!(options.cpu_memory, None);
        assert_eq!(options.disk_cache_dir, Some(PathBuf::from("offload")));
        assert_eq!(options.local_rank, 2);
    }

    #[test]
    fn test_extensions_take_several_names() {
        let cli = parse(&["--extensions", "character_bias", "other", "--cpu"]);
        assert_eq!(cli.extensions, vec!["character_bias", "other"]);
        assert!(cli.cpu);
    }

    #[test]
    fn test_listen_address() {
        assert_eq!(parse(&[]).listen_addr().to_string(), "127.0.0.1:7860");
        assert_eq!(
            parse(&["--listen", "--listen-port", "8080"])
                .listen_addr()
                .to_string(),
            "0.0.0.0:8080"
        );
    }

    #[test]
    fn test_default_command_is_serve() {
        assert_eq!(parse(&[]).command(), Commands::Serve);
        assert_eq!(
            parse(&["generate", "Once upon a time", "--max-new-tokens", "20"]).command(),
            Commands::Generate {
                prompt: Some("Once upon a time".to_string()),
                max_new_tokens: Some(20),
            }
        );
    }
}
