use crate::core::classify::{DEFAULT_BATCH_SIZE, DeviceRequest, Task};
use crate::core::comments::DEFAULT_MAX_PAGES;
use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "sentivid")]
#[command(about = "YouTube comment sentiment/emotion labeling pipeline")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch comments for a video into the raw dataset
    Fetch {
        /// YouTube video URL or video ID
        video: String,

        /// Stop after this many comment pages
        #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
        max_pages: usize,
    },

    /// Normalize the raw dataset into the clean dataset
    Clean {
        /// Video ID of an already fetched dataset
        video: String,
    },

    /// Classify the clean dataset into a labeled dataset
    Label {
        /// Video ID of an already cleaned dataset
        video: String,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Run fetch, clean, and label, skipping stages whose output exists
    Run {
        /// YouTube video URL or video ID
        video: String,

        /// Stop after this many comment pages
        #[arg(long, default_value_t = DEFAULT_MAX_PAGES)]
        max_pages: usize,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Filtered aggregates over a labeled dataset
    Stats {
        /// Video ID of an already labeled dataset
        video: String,

        /// Which labeled dataset to read
        #[arg(long, value_enum, default_value_t = TaskArg::Sentiment)]
        task: TaskArg,

        /// Comma-separated labels to keep
        #[arg(long)]
        labels: Option<String>,

        /// Keep rows whose cleaned text contains this substring
        #[arg(long)]
        contains: Option<String>,

        /// Keep rows with at least this many likes
        #[arg(long)]
        min_likes: Option<u64>,

        /// Show per-day per-label counts
        #[arg(long)]
        daily: bool,
    },

    /// List dataset files
    List,
}

#[derive(Args)]
pub struct ModelArgs {
    /// Classification task
    #[arg(long, value_enum, default_value_t = TaskArg::Sentiment)]
    pub task: TaskArg,

    /// Override the model checkpoint (required for --task emotion)
    #[arg(long)]
    pub model: Option<String>,

    /// Inference batch size
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Force CPU even if CUDA is available
    #[arg(long, conflicts_with = "cuda")]
    pub cpu: bool,

    /// Select a CUDA device by index
    #[arg(long)]
    pub cuda: Option<usize>,
}

impl ModelArgs {
    pub fn device_request(&self) -> DeviceRequest {
        if self.cpu {
            DeviceRequest::Cpu
        } else if let Some(index) = self.cuda {
            DeviceRequest::Cuda(index)
        } else {
            DeviceRequest::Default
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TaskArg {
    Sentiment,
    Emotion,
}

impl From<TaskArg> for Task {
    fn from(value: TaskArg) -> Self {
        match value {
            TaskArg::Sentiment => Task::Sentiment,
            TaskArg::Emotion => Task::Emotion,
        }
    }
}
