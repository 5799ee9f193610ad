//! Renders roff man pages for `cslapi` into `$OUT_DIR/man`.
//!
//! `cslapi.1` covers the global LAPI connection flags; every subcommand gets
//! its own page named after its path, e.g. `cslapi-bouncer-stream.1` or
//! `cslapi-watcher-push-alerts.1`. Packagers copy the directory as-is.

use std::fs;
use std::path::Path;

use clap::CommandFactory;

// Only the clap definitions are needed here; the handlers are not compiled.
#[path = "src/cli.rs"]
#[allow(dead_code)]
mod cli;

fn main() {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let Some(out_dir) = std::env::var_os("OUT_DIR") else {
        panic!("OUT_DIR is set by cargo for build scripts");
    };
    let man_dir = Path::new(&out_dir).join("man");
    if let Err(e) = fs::create_dir_all(&man_dir) {
        panic!("cannot create {}: {e}", man_dir.display());
    }

    let mut pending = vec![cli::Cli::command()];
    while let Some(cmd) = pending.pop() {
        let page = man_dir.join(format!("{}.1", cmd.get_name()));
        let mut roff = Vec::new();
        if let Err(e) = clap_mangen::Man::new(cmd.clone()).render(&mut roff) {
            panic!("rendering {}: {e}", page.display());
        }
        if let Err(e) = fs::write(&page, roff) {
            panic!("writing {}: {e}", page.display());
        }

        // `completions` is documented on the top-level page only.
        pending.extend(
            cmd.get_subcommands()
                .filter(|sub| !sub.is_hide_set() && sub.get_name() != "completions")
                .map(|sub| {
                    let name = format!("{}-{}", cmd.get_name(), sub.get_name());
                    sub.clone().name(name)
                }),
        );
    }
}
