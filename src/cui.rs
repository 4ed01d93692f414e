use std::collections::HashMap;
use std::io::Write;

use crossterm::style::Stylize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use libpact::flume::{Receiver, Sender};
use libpact::Event;

static BAR_FMT: &str = " {wide_msg} {total_bytes:>12} [{bar:>20}] {percent:>3}%";

/// Ask a yes/no question on the terminal.
pub fn prompt_yes_no(question: &str) -> bool {
    print!("{} [y/N] ", question);
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes" | "Yes")
}

fn prompt_index(max: usize) -> usize {
    print!("Enter a number (default 0): ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return 0;
    }
    line.trim().parse::<usize>().ok().filter(|&i| i < max).unwrap_or(0)
}

/// Drain engine events for the whole session, rendering notifications and
/// answering questions. Runs on its own thread; returns when the session
/// (and with it the bus) is dropped.
pub fn event_loop(rx: Receiver<Event>, tx: Sender<Event>, assume_yes: bool) {
    let mp = MultiProgress::new();
    let mut bars: HashMap<String, ProgressBar> = HashMap::new();

    while let Ok(event) = rx.recv() {
        match event {
            Event::ResolveDepsStart => println!("Resolving dependencies..."),
            Event::InterConflictsStart => println!("Looking for conflicting packages..."),
            Event::FileConflictsStart => println!("Checking for file conflicts..."),
            Event::IntegrityStart => println!("Checking package integrity..."),
            Event::DiskSpaceStart => println!("Checking available disk space..."),
            Event::RetrieveStart(repo) => {
                println!("Retrieving packages from {}...", repo);
            }
            Event::DownloadProgress(ctx) => {
                if ctx.dltotal == 0 {
                    continue;
                }
                let bar = bars.entry(ctx.filename.clone()).or_insert_with(|| {
                    let bar = mp.add(ProgressBar::new(ctx.dltotal));
                    bar.set_message(ctx.filename.clone());
                    bar.set_style(
                        ProgressStyle::default_bar()
                            .template(BAR_FMT)
                            .unwrap()
                            .progress_chars("#> "),
                    );
                    bar
                });
                bar.set_length(ctx.dltotal);
                bar.set_position(ctx.dlnow);
                if ctx.dlnow >= ctx.dltotal {
                    bar.finish();
                }
            }
            Event::AddStart(ctx) => println!("Installing {}-{}...", ctx.name, ctx.version),
            Event::AddDone(ctx) => {
                println!("Installing {}-{}...{}", ctx.name, ctx.version, "Ok".green())
            }
            Event::RemoveStart(ctx) => println!("Removing {}-{}...", ctx.name, ctx.version),
            Event::RemoveDone(ctx) => {
                println!("Removing {}-{}...{}", ctx.name, ctx.version, "Ok".green())
            }
            Event::UpgradeStart(ctx) => println!(
                "Upgrading {} ({} => {})...",
                ctx.name, ctx.old_version, ctx.new_version
            ),
            Event::UpgradeDone(ctx) => println!(
                "Upgrading {} ({} => {})...{}",
                ctx.name,
                ctx.old_version,
                ctx.new_version,
                "Ok".green()
            ),
            Event::TargetUpToDate(ctx) => {
                println!(
                    "{} {}-{} is up to date -- skipping",
                    "warning:".yellow(),
                    ctx.name,
                    ctx.version
                );
            }
            Event::PromptInstallIgnored(ctx) => {
                let answer = assume_yes
                    || prompt_yes_no(&format!(
                        "{}-{} is in the ignored set. Install anyway?",
                        ctx.name, ctx.version
                    ));
                let _ = tx.send(Event::PromptInstallIgnoredResult(answer));
            }
            Event::PromptReplacePackage(ctx) => {
                let answer = assume_yes
                    || prompt_yes_no(&format!(
                        "Replace {} with {}/{}?",
                        ctx.oldpkg, ctx.repo, ctx.newpkg
                    ));
                let _ = tx.send(Event::PromptReplacePackageResult(answer));
            }
            Event::PromptConflictRemove(ctx) => {
                let answer = assume_yes
                    || prompt_yes_no(&format!(
                        "{} conflicts with {} ({}). Remove {}?",
                        ctx.target, ctx.local, ctx.reason, ctx.local
                    ));
                let _ = tx.send(Event::PromptConflictRemoveResult(answer));
            }
            Event::PromptCorruptedDelete(ctx) => {
                let answer = assume_yes
                    || prompt_yes_no(&format!(
                        "File {} is corrupted ({}). Delete it?",
                        ctx.filename, ctx.reason
                    ));
                let _ = tx.send(Event::PromptCorruptedDeleteResult(answer));
            }
            Event::PromptRemoveUnresolvable(names) => {
                println!("The following packages cannot be resolved:");
                println!("  {}", names.join("  "));
                let answer = assume_yes
                    || prompt_yes_no("Remove them from the transaction and continue?");
                let _ = tx.send(Event::PromptRemoveUnresolvableResult(answer));
            }
            Event::PromptSelectProvider(ctx) => {
                let index = if assume_yes {
                    0
                } else {
                    println!("There are {} providers for '{}':", ctx.providers.len(), ctx.depend);
                    for (idx, provider) in ctx.providers.iter().enumerate() {
                        println!("  {}: {}", idx, provider);
                    }
                    prompt_index(ctx.providers.len())
                };
                let _ = tx.send(Event::PromptSelectProviderResult(index));
            }
            _ => {}
        }
    }
}
