// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Runs a task every two seconds, aligned to even seconds, and stops after a while.

use std::time::{Duration, SystemTime};

use metronome::{Scheduler, Task, TriggerOptions};

#[tokio::main]
async fn main() -> metronome::Result<()> {
    let task = Task::from_fn(|| {
        let since_epoch = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        println!("task ran at {}ms past the epoch", since_epoch.as_millis());
    });

    let options = TriggerOptions::new(task)
        .with_interval(Duration::from_secs(2))
        .with_correction(true)
        .with_first_trigger(true);

    let scheduler = Scheduler::new(options)?;
    println!("start: {:?}", scheduler.start());

    tokio::time::sleep(Duration::from_secs(7)).await;

    scheduler.stop();
    println!("state: {:?}", scheduler.state());

    Ok(())
}
