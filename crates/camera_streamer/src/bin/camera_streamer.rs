//! Camera Streamer CLI
//!
//! Usage:
//!   camera_streamer
//!   camera_streamer -c streamer.yaml
//!   camera_streamer -b v4l2 --dry-run

use camera_streamer::{
    ShutdownSignal, StreamSettings, Streamer, StreamerArgs, StreamerError, StreamerPolicy,
};

#[tokio::main]
async fn main() {
    let args: StreamerArgs = argh::from_env();

    // Initialize logging
    let env = env_logger::Env::default().default_filter_or(args.log_filter());
    env_logger::init_from_env(env);

    log::info!("{}", "=".repeat(60));
    log::info!("Pi Camera Streamer for Frigate");
    log::info!("{}", "=".repeat(60));

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!("Error: {}", e);
            // Logging may be filtered out; the failure still reaches stderr
            eprintln!("camera_streamer: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: StreamerArgs) -> Result<i32, StreamerError> {
    let settings = StreamSettings::from_env()?;

    let mut policy = match &args.config {
        Some(path) => {
            log::info!("Loading policy file: {}", path);
            StreamerPolicy::from_file(path)?
        }
        None => StreamerPolicy::default(),
    };
    policy.apply_env(|name| std::env::var(name).ok())?;

    if let Some(backends) = args.backends {
        policy.backends = backends;
        policy.validate()?;
    }
    if args.no_wait {
        policy.readiness.enabled = false;
    }

    let streamer = Streamer::new(settings, policy);

    // Dry run mode
    if args.dry_run {
        let plan = streamer.plan().await?;
        println!("{}", plan);
        return Ok(0);
    }

    let mut shutdown = ShutdownSignal::install()?;
    let outcome = streamer.run(&mut shutdown).await?;

    log::info!("Camera streamer exiting");
    Ok(outcome.exit_code())
}
