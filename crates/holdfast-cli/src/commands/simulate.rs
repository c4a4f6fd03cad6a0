//! Scripted gesture run against in-memory collaborators.
//!
//! Time is virtual: the driver is advanced straight to each scripted instant,
//! so a fifteen-second run finishes immediately. Events print as JSON lines.

use std::sync::Arc;

use clap::Args;
use holdfast_core::capture::FrameCache;
use holdfast_core::events::Event;
use holdfast_core::memory::{MemoryStore, SyntheticCamera};
use holdfast_core::timer::now_ms;
use holdfast_core::{Collaborators, Config, CoreSettings, Database, HabitCore, ImageTransform, Task};

#[derive(Args)]
pub struct SimulateArgs {
    /// Task ID to press
    #[arg(long, default_value = "read")]
    task: String,
    /// Task title, used as the transform context
    #[arg(long, default_value = "Read")]
    title: String,
    /// Release the press this many ms after it starts (omit to hold)
    #[arg(long)]
    release_at: Option<u64>,
    /// Total simulated duration in ms
    #[arg(long, default_value = "15000")]
    run_for: u64,
    /// Refuse camera access
    #[arg(long)]
    deny_camera: bool,
    /// Make the photo upload fail
    #[arg(long)]
    fail_upload: bool,
    /// Run the punishment transform after a successful upload
    #[arg(long)]
    transform: bool,
    /// Start the task as already done today
    #[arg(long)]
    done: bool,
    /// Cache captured photos in the local database, stamped with wall-clock time
    #[arg(long)]
    persist: bool,
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let mut task = Task::new(args.task.as_str(), args.title.as_str());
    if args.done {
        task = task.completed();
    }

    let store = Arc::new(MemoryStore::with_tasks(vec![task]));
    store.fail_store(args.fail_upload);
    let camera = Arc::new(SyntheticCamera::default());
    camera.deny(args.deny_camera);

    let (base, cache) = if args.persist {
        let db: Arc<dyn FrameCache> = Arc::new(Database::open()?);
        (now_ms(), Some(db))
    } else {
        (0, None)
    };

    let deps = Collaborators {
        tasks: store.clone(),
        blobs: store.clone(),
        camera: camera.clone(),
        transform: if args.transform {
            Some(store.clone() as Arc<dyn ImageTransform>)
        } else {
            None
        },
        cache,
    };
    let mut core = HabitCore::new(CoreSettings::from(&config), deps, base);

    super::runtime()?.block_on(async move {
        let mut events = core.refresh().await?;
        events.extend(core.press_start(args.task.as_str(), base));
        if let Some(release) = args.release_at.filter(|r| *r < args.run_for) {
            events.extend(core.advance_to(base + release).await);
            events.extend(core.press_end(base + release));
        }
        events.extend(core.advance_to(base + args.run_for).await);
        if core.popup().is_some() {
            events.extend(core.close_popup());
        }
        core.dispose();
        print_events(&events)
    })
}

fn print_events(events: &[Event]) -> Result<(), Box<dyn std::error::Error>> {
    for event in events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}
