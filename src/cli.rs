use clap::Parser;

use crate::config::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_NAME_LENGTH, DEFAULT_WINDOW_SIZE, ExtractorConfig,
};

#[derive(Parser, Debug, Clone)]
#[command(name = "streamzip")]
#[command(version)]
#[command(about = "Unzip archives while they download or stream in", long_about = None)]
#[command(after_help = "Examples:\n  \
  streamzip data1.zip -x joe        extract all files except joe from data1.zip\n  \
  streamzip -p foo.zip | more       send contents of foo.zip via pipe into more\n  \
  curl -s https://example.com/a.zip | streamzip -l -   list files from a pipe\n  \
  streamzip -d out https://example.com/archive.zip     extract while downloading")]
pub struct Cli {
    /// ZIP file path, HTTP URL, or - for stdin
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely/show version info
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Bytes buffered between input chunks
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_WINDOW_SIZE)]
    pub window_size: usize,

    /// Longest accepted entry name
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_NAME_LENGTH)]
    pub max_name_length: usize,

    /// Content pieces queued per entry before parsing pauses
    #[arg(long, value_name = "N", default_value_t = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_stdin(&self) -> bool {
        self.file == "-"
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            window_size: self.window_size,
            max_name_length: self.max_name_length,
            channel_capacity: self.channel_capacity,
            ..ExtractorConfig::default()
        }
    }
}
