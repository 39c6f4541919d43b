use blocktrace_codec::{ContainerSlot, ContainerSnapshot};
use blocktrace_common::{Action, ActorRef, BlockPos, WorldId, now_secs, parse_duration, time_ago};
use blocktrace_kernel::{BlockState, GridWorld, WorldMutator, WorldView, decode_block};
use blocktrace_rollback::RollbackEngine;
use blocktrace_store::{ChangeFilter, ChangeLogStore, ChangeRecord, QueryOrder};
use blocktrace_track::{ChangeTracker, TrackerConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "blocktrace-cli", about = "CLI for blocktrace audit operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and registry info
    Info,
    /// Run a scripted session: track changes, roll them back, restore them
    Demo {
        /// Store directory; a temporary one is used if omitted
        #[arg(short, long)]
        store: Option<PathBuf>,
    },
    /// Query a change log
    Query {
        /// Store directory
        #[arg(short, long)]
        store: PathBuf,
        /// World to query
        #[arg(short, long, default_value = "overworld")]
        world: String,
        /// Center x
        #[arg(short, default_value = "0")]
        x: i32,
        /// Center y
        #[arg(short, default_value = "64")]
        y: i32,
        /// Center z
        #[arg(short, default_value = "0")]
        z: i32,
        /// Bounding-box radius; omit to match the whole world
        #[arg(short, long)]
        radius: Option<i32>,
        /// Time window like "2h30m"; omit for all history
        #[arg(short, long)]
        time: Option<String>,
        /// Actor identity (player uuid or numeric type tag)
        #[arg(short, long)]
        actor: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("blocktrace-cli v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "block registry: v{} ({} known types)",
                blocktrace_kernel::BLOCK_TABLE_VERSION,
                (0u32..256)
                    .filter(|id| blocktrace_kernel::block_def(*id).is_some())
                    .count()
            );
            println!(
                "entity table: v{}",
                blocktrace_common::actor::ENTITY_TABLE_VERSION
            );
        }
        Commands::Demo { store } => run_demo(store)?,
        Commands::Query {
            store,
            world,
            x,
            y,
            z,
            radius,
            time,
            actor,
        } => {
            let store = ChangeLogStore::open(&store)?;
            let now = now_secs();
            let mut filter = ChangeFilter::all(WorldId::new(world), BlockPos::new(x, y, z));
            filter.radius = radius;
            filter.actor = actor;
            if let Some(window) = time.as_deref().and_then(parse_duration) {
                filter = filter.since(now, window);
            }

            let records = store.query(&filter, QueryOrder::Descending)?;
            println!("{} matching records", records.len());
            for record in &records {
                print_record(record, now);
            }
        }
    }

    Ok(())
}

fn print_record(record: &ChangeRecord, now: u64) {
    let describe = |payload: &str| -> String {
        if record.action == Action::ContainerChange {
            match ContainerSnapshot::decode(payload) {
                Ok(snap) if snap.is_empty() => "empty".to_string(),
                Ok(snap) => format!("{} slots", snap.slots.len()),
                Err(_) => "<corrupt>".to_string(),
            }
        } else {
            decode_block(payload)
                .map(|b| b.name())
                .unwrap_or_else(|_| "<corrupt>".to_string())
        }
    };
    println!(
        "#{} {} - {} {} {} -> {} at {}",
        record.id,
        time_ago(record.timestamp, now, 2),
        record.actor.display_name,
        record.action,
        describe(&record.prior),
        describe(&record.posterior),
        record.position,
    );
}

fn run_demo(store_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let tmp;
    let root = match store_dir {
        Some(dir) => dir,
        None => {
            tmp = tempfile::tempdir()?;
            tmp.path().join("log")
        }
    };

    let store = Arc::new(ChangeLogStore::open(&root)?);
    let mut tracker = ChangeTracker::new(Arc::clone(&store), TrackerConfig::default());
    let engine = RollbackEngine::new(Arc::clone(&store));
    let mut world = GridWorld::new(WorldId::new("overworld"));

    let alice = ActorRef::Player {
        uuid: Uuid::new_v4(),
        name: "alice".into(),
    };

    // A small build session: a stone platform, a door, a stocked chest.
    println!("== tracking a session");
    for x in 0..3 {
        let pos = BlockPos::new(x, 64, 0);
        tracker.on_block_place(&world, &alice, pos, BlockState::new(1, 0));
        world.set_block(pos, BlockState::new(1, 0))?;
    }
    let door = BlockPos::new(1, 65, 0);
    tracker.on_block_place(&world, &alice, door, BlockState::new(64, 0));
    world.set_block(door, BlockState::new(64, 0))?;
    world.set_block(door.offset(0, 1, 0), BlockState::new(64, 0x08))?;
    world.step();
    let confirmed = tracker.confirm_placements(&world);
    println!("confirmed {confirmed} deferred placements");

    let chest = BlockPos::new(2, 65, 0);
    world.set_block(chest, BlockState::new(54, 0))?;
    world.set_container(
        chest,
        Some(ContainerSnapshot {
            slots: vec![ContainerSlot {
                index: 0,
                item: "diamond".into(),
                count: 5,
                meta: None,
            }],
        }),
    )?;
    tracker.on_block_break(&world, &alice, chest);
    world.set_block(chest, BlockState::AIR)?;

    println!("{} records in the log", store.record_count());

    // Roll the session back.
    println!("== rollback");
    let filter = ChangeFilter::all(WorldId::new("overworld"), BlockPos::new(0, 64, 0))
        .since(now_secs(), 3600);
    let report = engine.rollback(&mut world, &filter)?;
    println!("rollback: {report}");
    println!(
        "chest restored: block={}, contents={}",
        world.block_at(chest).name(),
        world
            .container_at(chest)
            .map(|c| c.slots.len())
            .unwrap_or(0),
    );

    // And forward again.
    println!("== restore");
    let report = engine.restore(&mut world, &filter)?;
    println!("restore: {report}");
    println!("chest broken again: block={}", world.block_at(chest).name());

    // Show the history the way an inspector would see it.
    println!("== history at the chest cell");
    let now = now_secs();
    for record in tracker.history_at(&world, chest) {
        print_record(&record, now);
    }

    Ok(())
}
