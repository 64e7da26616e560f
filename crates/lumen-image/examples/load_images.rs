//! Load images given on the command line, newest request wins.
//!
//! Every path is submitted in quick succession, the way a user flicking
//! through a folder would. Only images that are still current when their
//! decode finishes are reported.
//!
//! Run with: cargo run -p lumen-image --example load_images -- a.png b.jpg c.gif

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use lumen_core::DispatchQueue;
use lumen_image::{ImageLoadTask, ImageSource, handler_fn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        eprintln!("usage: load_images <image>...");
        return Ok(());
    }

    // The main thread plays the role of the UI thread.
    let ui = DispatchQueue::new();
    let finished = Arc::new(AtomicBool::new(false));

    let task = {
        let loaded_flag = finished.clone();
        let failed_flag = finished.clone();
        let last = paths.len() as u64;
        ImageLoadTask::builder().max_dimensions(16_384, 16_384).build(
            ui.handle(),
            handler_fn(
                move |ticket, image| {
                    println!(
                        "#{}: {}x{} {:?}",
                        ticket.id(),
                        image.width(),
                        image.height(),
                        image.format()
                    );
                    if ticket.id() == last {
                        loaded_flag.store(true, Ordering::SeqCst);
                    }
                },
                move |ticket, error| {
                    eprintln!("#{}: {error}", ticket.id());
                    if ticket.id() == last {
                        failed_flag.store(true, Ordering::SeqCst);
                    }
                },
            ),
        )
    };

    for path in &paths {
        task.submit(ImageSource::open(path)?)?;
    }

    let deadline = Instant::now() + Duration::from_secs(30);
    while !finished.load(Ordering::SeqCst) && Instant::now() < deadline {
        ui.process_for(Duration::from_millis(16));
    }

    task.dispose();
    Ok(())
}
