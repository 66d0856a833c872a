use sentivid::cli::{Cli, Commands, ModelArgs};
use sentivid::core::{
    CancelFlag, DatasetCache, DatasetStore, Filters, ModernBertClassifier, Task, YouTubeApi,
    apply_filters, daily_label_counts, extract_video_id, fetch_comments, label_counts,
    label_records, normalize_records,
};
use sentivid::error::{Error, Result};
use clap::Parser;
use std::env;

const API_KEY_ENV: &str = "YT_API_KEY";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    // Ctrl-C requests cancellation at the next page/batch boundary.
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("cancellation requested");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Fetch { video, max_pages } => {
            run_fetch(&video, max_pages, &cancel).await?;
        }
        Commands::Clean { video } => {
            run_clean(&video)?;
        }
        Commands::Label { video, model } => {
            run_label(&video, &model, &cancel).await?;
        }
        Commands::Run {
            video,
            max_pages,
            model,
        } => {
            run_pipeline(&video, max_pages, &model, &cancel).await?;
        }
        Commands::Stats {
            video,
            task,
            labels,
            contains,
            min_likes,
            daily,
        } => {
            run_stats(&video, task.into(), labels, contains, min_likes, daily)?;
        }
        Commands::List => {
            run_list()?;
        }
    }

    Ok(())
}

async fn run_fetch(video_input: &str, max_pages: usize, cancel: &CancelFlag) -> Result<()> {
    let video_id =
        extract_video_id(video_input).ok_or_else(|| Error::custom("Invalid video URL or ID"))?;
    let api_key =
        env::var(API_KEY_ENV).map_err(|_| Error::custom(format!("{API_KEY_ENV} is not set")))?;

    println!("Fetching comments for video: {video_id}");

    let api = YouTubeApi::new(api_key, &video_id)?;
    let records = fetch_comments(&api, max_pages, cancel).await?;
    let path = DatasetStore::save_raw(&video_id, &records)?;

    println!("Saved {} comments to {}", records.len(), path.display());
    Ok(())
}

fn run_clean(video_input: &str) -> Result<()> {
    let video_id =
        extract_video_id(video_input).ok_or_else(|| Error::custom("Invalid video URL or ID"))?;

    let raw = DatasetStore::load_raw(&video_id)?;
    let total = raw.len();
    let cleaned = normalize_records(raw);
    let path = DatasetStore::save_clean(&video_id, &cleaned)?;

    println!(
        "Cleaned {} comments ({} dropped) into {}",
        cleaned.len(),
        total - cleaned.len(),
        path.display()
    );
    Ok(())
}

async fn run_label(video_input: &str, args: &ModelArgs, cancel: &CancelFlag) -> Result<()> {
    let video_id =
        extract_video_id(video_input).ok_or_else(|| Error::custom("Invalid video URL or ID"))?;
    let task: Task = args.task.into();

    let model_id = match (&args.model, task.default_model_id()) {
        (Some(id), _) => id.clone(),
        (None, Some(id)) => id.to_string(),
        (None, None) => {
            return Err(Error::model(format!(
                "no built-in checkpoint for --task {task}; pass --model with a \
                 ModernBERT sequence-classification checkpoint"
            )));
        }
    };

    let records = DatasetStore::load_clean(&video_id)?;
    let device = args.device_request().resolve()?;
    let batch_size = args.batch_size;

    println!(
        "Labeling {} comments with {model_id} (task: {task})",
        records.len()
    );

    // Model loading and the forward passes are synchronous candle work.
    let cancel = cancel.clone();
    let labeled = tokio::task::spawn_blocking(move || {
        let classifier = ModernBertClassifier::load(&model_id, device)?;
        label_records(&classifier, task, &records, batch_size, &cancel)
    })
    .await
    .map_err(|e| Error::custom(format!("inference task failed: {e}")))??;

    let path = DatasetStore::save_labeled(&video_id, task.tag(), &labeled)?;
    println!(
        "Saved {} labeled comments to {}",
        labeled.len(),
        path.display()
    );

    for record in labeled.iter().take(5) {
        println!(
            "  [{} {:.2}] {}",
            record.label,
            record.score,
            preview(&record.comment_clean)
        );
    }

    Ok(())
}

/// Full pipeline with stage resume: a stage whose output file already exists
/// is skipped, so a failed run can be retried without repeating completed
/// work.
async fn run_pipeline(
    video_input: &str,
    max_pages: usize,
    args: &ModelArgs,
    cancel: &CancelFlag,
) -> Result<()> {
    let video_id =
        extract_video_id(video_input).ok_or_else(|| Error::custom("Invalid video URL or ID"))?;
    let task: Task = args.task.into();

    if DatasetStore::raw_exists(&video_id) {
        println!("Raw dataset already exists. Skipping fetch.");
    } else {
        run_fetch(&video_id, max_pages, cancel)
            .await
            .map_err(|e| Error::custom(format!("fetch stage failed: {e}")))?;
    }

    if DatasetStore::clean_exists(&video_id) {
        println!("Clean dataset already exists. Skipping clean.");
    } else {
        run_clean(&video_id).map_err(|e| Error::custom(format!("clean stage failed: {e}")))?;
    }

    if DatasetStore::labeled_exists(&video_id, task.tag()) {
        println!("Labeled dataset already exists. Skipping label.");
    } else {
        run_label(&video_id, args, cancel)
            .await
            .map_err(|e| Error::custom(format!("label stage failed: {e}")))?;
    }

    Ok(())
}

fn run_stats(
    video_input: &str,
    task: Task,
    labels: Option<String>,
    contains: Option<String>,
    min_likes: Option<u64>,
    daily: bool,
) -> Result<()> {
    let video_id =
        extract_video_id(video_input).ok_or_else(|| Error::custom("Invalid video URL or ID"))?;

    let cache = DatasetCache::new();
    let path = DatasetStore::labeled_path(&video_id, task.tag())?;
    let records = cache.load(&path)?;

    let filters = Filters {
        labels: labels.map(|s| s.split(',').map(|l| l.trim().to_string()).collect()),
        contains,
        min_likes,
    };
    let filtered = apply_filters(&records, &filters);

    println!(
        "{} of {} comments match ({})",
        filtered.len(),
        records.len(),
        path.display()
    );

    let counts = label_counts(filtered.iter().copied());
    for (label, count) in &counts {
        let ratio = if filtered.is_empty() {
            0.0
        } else {
            *count as f64 / filtered.len() as f64
        };
        println!("  {label:<10} {count:>6}  ({:.1}%)", ratio * 100.0);
    }

    if daily {
        println!();
        for ((date, label), count) in daily_label_counts(filtered.iter().copied()) {
            println!("  {date}  {label:<10} {count:>6}");
        }
    }

    Ok(())
}

fn run_list() -> Result<()> {
    let entries = DatasetStore::list_datasets()?;

    if entries.is_empty() {
        println!("No datasets found.");
        return Ok(());
    }

    println!("Found {} datasets:", entries.len());
    println!();

    for entry in entries {
        let size_kb = entry.size / 1024;
        let size_str = if size_kb < 1024 {
            format!("{size_kb}KB")
        } else {
            format!("{:.1}MB", size_kb as f64 / 1024.0)
        };

        println!(
            "{:<8} {:<40} {}",
            entry.stage.to_string(),
            entry.name,
            size_str
        );
    }

    Ok(())
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(60).collect();
    if text.chars().count() > 60 {
        out.push('…');
    }
    out
}
