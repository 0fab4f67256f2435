// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use crate::args::{Args, MasterConfig};
use clap::Parser;
use eyre::{Report, eyre};
use farm_oracle::{MemoryStore, Oracle, Router};
use farm_task::{RunningTask, Service, TaskError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

mod args;
mod logging;

const WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Anything the master starts, erased so the lifecycle code doesn't care which kind it is.
trait Supervised {
    fn name(&self) -> &str;
    fn is_finished(&self) -> bool;
    fn request_stop(&self) -> Result<(), TaskError>;
    fn join(self: Box<Self>) -> Result<(), TaskError>;
}

impl<S: Service> Supervised for RunningTask<S> {
    fn name(&self) -> &str {
        RunningTask::name(self)
    }

    fn is_finished(&self) -> bool {
        RunningTask::is_finished(self)
    }

    fn request_stop(&self) -> Result<(), TaskError> {
        RunningTask::request_stop(self)
    }

    fn join(self: Box<Self>) -> Result<(), TaskError> {
        RunningTask::join(*self).map(|_| ())
    }
}

fn start_tasks(
    zmq_ctx: &zmq::Context,
    config: &MasterConfig,
) -> Result<Vec<Box<dyn Supervised>>, Report> {
    let mut tasks: Vec<Box<dyn Supervised>> = vec![];
    // The router binds both queues, so it has to exist before any oracle connects.
    let router = Router::new(zmq_ctx.clone(), &config.db_queue, &config.oracle_queue)
        .map_err(|e| eyre!("Unable to start router on {}: {}", config.db_queue, e))?
        .with_poll_timeout(config.poll_timeout())
        .spawn()?;
    tasks.push(Box::new(router));

    let store = MemoryStore::new(config.build_abis.clone());
    for _ in 0..config.oracle_count {
        let oracle = Oracle::new(zmq_ctx.clone(), &config.oracle_queue, store.connect())?
            .with_poll_timeout(config.poll_timeout())
            .spawn()?;
        tasks.push(Box::new(oracle));
    }
    Ok(tasks)
}

fn stop_tasks(tasks: Vec<Box<dyn Supervised>>) {
    for task in &tasks {
        if let Err(e) = task.request_stop() {
            warn!(task = task.name(), error = ?e, "Unable to ask task to stop");
        }
    }
    for task in tasks {
        let name = task.name().to_string();
        if let Err(e) = task.join() {
            error!(task = %name, error = ?e, "Task failed");
        }
    }
}

/// Brings up the database side of the build farm:
///   * A router that clients connect to
///   * A pool of oracles behind it, sharing one store
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let args = Args::parse();
    logging::init_tracing(args.debug).map_err(|e| eyre!("Unable to configure logging: {}", e))?;
    let config = args.load_config()?;

    let zmq_ctx = zmq::Context::new();
    zmq_ctx.set_io_threads(args.num_io_threads).map_err(|e| {
        eyre!(
            "Failed to set number of IO threads to {}: {}",
            args.num_io_threads,
            e
        )
    })?;

    let kill_switch = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, kill_switch.clone())?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, kill_switch.clone())?;

    let tasks = start_tasks(&zmq_ctx, &config)?;
    info!(
        db_queue = %config.db_queue,
        oracles = config.oracle_count,
        "Master started. Listening for database requests."
    );

    while !kill_switch.load(Ordering::Relaxed) {
        if let Some(task) = tasks.iter().find(|t| t.is_finished()) {
            warn!(task = task.name(), "Task exited unexpectedly; shutting down");
            break;
        }
        thread::sleep(WATCH_INTERVAL);
    }

    info!("Stopping tasks...");
    stop_tasks(tasks);
    info!("Done.");
    Ok(())
}
