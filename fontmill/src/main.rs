use std::{io::Write, sync::Arc};

use clap::Parser;
use fontmill::{require_dir, Args, BuildRequest, Config, Error, LogSink, StageSequencer};
use log::{error, info, warn};

fn main() -> Result<(), Error> {
    let args = Args::parse();

    let mut logger = env_logger::builder();
    // RUST_LOG, when set, wins over --verbose
    if std::env::var_os("RUST_LOG").is_none() {
        logger.filter_level(args.verbose.into());
    }
    logger
        .format(|buf, record| {
            let ts = buf.timestamp_micros();
            let style = buf.default_level_style(record.level());
            writeln!(
                buf,
                "{}: {:?}: {style}{}{style:#}: {}",
                ts,
                std::thread::current().id(),
                record.level(),
                record.args()
            )
        })
        .init();

    require_dir(&args.build_dir)?;
    let config = Config::new(args);
    if !config.init()? {
        info!("Same arguments as the previous build");
    }

    let request = BuildRequest::new(&config.args)?;
    let mut sequencer = StageSequencer::new(request, Arc::new(LogSink));
    let timing = config.args.timing;
    let result = sequencer.run();
    if timing {
        println!("{}", sequencer.timer().summary());
    }
    let report = result.inspect_err(|e| error!("{e}"))?;

    for file in report.written.iter() {
        info!("Wrote {}", file.display());
    }
    if !report.is_success() {
        for (name, e) in report.failures.iter() {
            warn!("{name} failed: {}", e.root());
        }
        return Err(Error::OutputsFailed {
            failed: report.failures.len(),
            requested: report.instances,
        });
    }
    Ok(())
}
