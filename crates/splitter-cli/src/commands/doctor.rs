use super::{EXIT_FAILURE, EXIT_SUCCESS};
use console::Style;
use splitter_core::{SessionLock, SplitterConfig};
use splitter_runtime::select_backends;

pub fn run(config: &SplitterConfig, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_backend(config, &mut checks, &mut all_pass);
    check_prereqs(config, &mut checks, &mut all_pass);
    check_home(config, &mut checks, &mut all_pass);

    print_results(config, &checks, all_pass, json_output)
}

fn check_backend(config: &SplitterConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    match select_backends(&config.backend, &config.backend_options()) {
        Ok(_) => checks.push(Check::pass(
            "backend",
            &format!("Backend '{}' is available", config.backend),
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("backend", &e.to_string()));
        }
    }
}

fn check_prereqs(config: &SplitterConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    if config.backend != "rpm" {
        checks.push(Check::info(
            "host_tools",
            &format!("Host tools not needed by the '{}' backend", config.backend),
        ));
        return;
    }
    let missing = splitter_runtime::check_prereqs();
    if missing.is_empty() {
        checks.push(Check::pass("host_tools", "Host tools available"));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "host_tools",
            &splitter_runtime::format_missing(&missing),
        ));
    }
    if !splitter_runtime::cert::running_as_root() {
        checks.push(Check::warn(
            "privileges",
            "Not running as root: packages cannot be registered in the RPM database",
        ));
    }
}

fn check_home(config: &SplitterConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let layout = config.layout();
    let home = layout.root();
    if !home.exists() {
        checks.push(Check::info(
            "home",
            &format!("{} does not exist yet (created on first cut)", home.display()),
        ));
        return;
    }
    checks.push(Check::pass("home", &format!("Home directory {}", home.display())));

    match SessionLock::try_acquire(&layout.lock_file()) {
        Ok(Some(_)) => checks.push(Check::pass("session_lock", "Session lock is free")),
        Ok(None) => checks.push(Check::warn(
            "session_lock",
            "Session lock is held by another splitter process",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "session_lock",
                &format!("Cannot check session lock: {e}"),
            ));
        }
    }
}

fn print_results(
    config: &SplitterConfig,
    checks: &[Check],
    all_pass: bool,
    json_output: bool,
) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "config": config,
            "home": config.home_dir(),
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Splitter Doctor\n");
        println!("  home:        {}", config.home_dir().display());
        println!("  backend:     {}", config.backend);
        println!("  slice repo:  {}", config.slice_repo);
        println!();
        for check in checks {
            let icon = match check.status {
                "pass" => Style::new().green().apply_to("✓"),
                "fail" => Style::new().red().apply_to("✗"),
                "warn" => Style::new().yellow().apply_to("⚠"),
                _ => Style::new().apply_to("ℹ"),
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &'static str, status: &'static str, message: &str) -> Self {
        Self {
            name,
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &'static str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &'static str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &'static str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &'static str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
