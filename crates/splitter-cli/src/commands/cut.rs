use super::{json_pretty, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use console::Style;
use splitter_core::{CutReport, CutRequest, Splitter, SplitterConfig};
use splitter_runtime::select_backends;

pub fn run(config: &SplitterConfig, request: &CutRequest, json: bool) -> Result<u8, String> {
    let backends = select_backends(&config.backend, &config.backend_options())
        .map_err(|e| e.to_string())?;
    let splitter = Splitter::new(config, &backends);

    let pb = if json {
        None
    } else {
        Some(spinner("resolving slices..."))
    };
    let progress = |package: &str| {
        if let Some(ref pb) = pb {
            pb.set_message(format!("cutting {package}..."));
        }
    };

    let report = match splitter.cut_with_progress(request, &progress) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                let done = if r.dry_run { "plan ready" } else { "slices cut" };
                spin_ok(pb, done);
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "cut failed");
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(EXIT_SUCCESS)
}

fn print_report(report: &CutReport) {
    let warn = Style::new().yellow();
    println!(
        "{} slices from {} ({})",
        report.slices.len(),
        report.release,
        report.arch
    );
    for slice in &report.slices {
        println!("  {slice}");
    }

    if report.dry_run {
        println!("\nplan:");
        for plan in &report.plan {
            println!(
                "  {}: {} patterns, {} extras",
                plan.package,
                plan.patterns.len(),
                plan.extras
            );
        }
    } else {
        println!("\npackages:");
        for pkg in &report.packages {
            let cert = if pkg.certified { "" } else { " (not registered)" };
            println!(
                "  {}: {} files, {} extra{cert}",
                pkg.package,
                pkg.extracted.len(),
                pkg.extra_files.len()
            );
        }
    }

    for skipped in &report.skipped {
        println!(
            "  {} {}: {}",
            warn.apply_to("skipped"),
            skipped.package,
            skipped.reason
        );
    }
    for package in &report.extras_only {
        println!(
            "  {} {package}: extras without common patterns",
            warn.apply_to("ignored")
        );
    }
    for failure in &report.manifest_failures {
        println!(
            "  {} {}",
            warn.apply_to("unreadable slice definition"),
            failure.path.display()
        );
    }

    if !report.dry_run {
        println!("\nfiles extracted to: {}", report.output.display());
    }
}
