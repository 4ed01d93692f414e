use anyhow::Result;
use libpact::Session;
use tracing_subscriber::EnvFilter;

mod clap_app;
mod cmd;
mod cui;
mod util;

fn main() {
    let matches = clap_app::build().get_matches();

    let filter = EnvFilter::try_from_env("PACT_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if matches.get_flag("verbose") {
            "debug"
        } else {
            "warn"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    match run(&matches) {
        Ok(()) => {}
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(1);
        }
    }
}

fn run(matches: &clap::ArgMatches) -> Result<()> {
    let session = match matches.get_one::<String>("config") {
        Some(path) => Session::new_with(path)?,
        None => Session::new()?,
    };

    // the engine is synchronous; events and questions drain on their own
    // thread for the whole session
    let rx = session.event_bus().receiver();
    let tx = session.event_bus().sender();
    let assume_yes = matches.get_flag("yes");
    let handle = std::thread::spawn(move || cui::event_loop(rx, tx, assume_yes));

    let ret = match matches.subcommand() {
        Some(("install", matches)) => cmd::cmd_install(matches, &session),
        Some(("remove", matches)) => cmd::cmd_remove(matches, &session),
        Some(("upgrade", matches)) => cmd::cmd_upgrade(matches, &session),
        Some(("update", matches)) => cmd::cmd_update(matches, &session),
        Some(("list", matches)) => cmd::cmd_list(matches, &session),
        Some(("search", matches)) => cmd::cmd_search(matches, &session),
        Some(("info", matches)) => cmd::cmd_info(matches, &session),
        Some(("completions", matches)) => cmd::cmd_completions(matches),
        _ => unreachable!(),
    };

    // dropping the session closes the bus and ends the event loop
    drop(session);
    let _ = handle.join();
    ret
}
