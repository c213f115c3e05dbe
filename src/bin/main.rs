//! Keyvault CLI
//!
//!   keyvault init                 → Set the vault password (prompts twice)
//!   keyvault status               → {"state", "locked", "initialized", "wallets"}
//!   keyvault generate             → New wallet, needs the password
//!   keyvault list                 → Wallet cards (address, created, explorer)
//!   keyvault reveal <address>     → Private key after password confirmation
//!   keyvault balance <address>    → Balance from the configured RPC endpoint
//!   keyvault repl                 → Interactive session with lock timer
//!   keyvault serve                → HTTP JSON API
//!
//! The password comes from --password, KEYVAULT_PASSWORD, or a prompt.
//!
//! Output format:
//!   --json     Output raw JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use keyvault::auth::forms;
use keyvault::logging::init_logging;
use keyvault::{Session, Shutdown, Ticker, TickerConfig, Vault, VaultConfig};
use serde_json::{json, Value};
use std::env;
use std::io::{self, IsTerminal, Write};
use tracing::debug;

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(args.get(1..).unwrap_or_default());

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("keyvault {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("init") => cmd_init(&opts),
        Some("status") => cmd_status(&opts),
        Some("generate") | Some("new") => cmd_generate(&opts),
        Some("list") | Some("ls") => cmd_list(&opts),
        Some("reveal") => cmd_reveal(&opts),
        Some("balance") => cmd_balance(&opts),
        Some("repl") => cmd_repl(&opts),
        #[cfg(feature = "server")]
        Some("serve") => cmd_serve(&opts),
        Some(cmd) => Err(format!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = !opts.json && (opts.pretty || io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": e}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    if pretty {
        serde_json::to_string_pretty(value).unwrap_or_default()
    } else {
        value.to_string()
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    target: Option<String>,
    app: Option<String>,
    data_dir: Option<String>,
    password: Option<String>,
    port: Option<u16>,
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        // Load .env file if present
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"');
                    if !value.is_empty() && env::var(key.trim()).is_err() {
                        env::set_var(key.trim(), value);
                    }
                }
            }
        }

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--app" | "-a" => {
                    if i + 1 < args.len() {
                        opts.app = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--data-dir" | "-d" => {
                    if i + 1 < args.len() {
                        opts.data_dir = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--password" => {
                    if i + 1 < args.len() {
                        opts.password = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--port" | "-p" => {
                    if i + 1 < args.len() {
                        opts.port = args[i + 1].parse().ok();
                        i += 1;
                    }
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        let mut positional = positional.into_iter();
        opts.command = positional.next();
        opts.target = positional.next();

        // Environment variables (lower priority than CLI args)
        if opts.password.is_none() {
            opts.password = env::var(keyvault::core::paths::env::PASSWORD).ok().filter(|s| !s.is_empty());
        }
        if opts.port.is_none() {
            opts.port = env::var(keyvault::core::paths::env::PORT).ok().and_then(|s| s.parse().ok());
        }

        opts
    }
}

fn print_usage() {
    println!(
        r#"keyvault - password-gated wallet vault

USAGE:
    keyvault <command> [address] [options]

COMMANDS:
    init                    Set the vault password
    status                  Session and storage status
    generate                Create a new wallet
    list                    List wallets
    reveal <address>        Show a wallet's private key
    balance <address>       Fetch a wallet's balance
    repl                    Interactive mode
    serve                   Start HTTP server

OPTIONS:
    --app, -a <name>        Application name (env: KEYVAULT_APP)
    --data-dir, -d <path>   Data directory (env: KEYVAULT_DATA_DIR)
    --password <pw>         Vault password (env: KEYVAULT_PASSWORD)
    --port, -p <port>       Server port (default: 8080, env: KEYVAULT_PORT)

OUTPUT OPTIONS:
    --json                  Raw JSON output
    --pretty                Pretty-print JSON
    --version, -V           Print version

EXAMPLES:
    keyvault init
    keyvault generate --password "correct horse"
    keyvault reveal 0xAbC... --json | jq -r .private_key
"#
    );
}

fn load_vault(opts: &ParsedArgs) -> Result<Vault, String> {
    let mut config = VaultConfig::from_env();
    if let Some(app) = &opts.app {
        config.app = app.clone();
    }
    if let Some(dir) = &opts.data_dir {
        config = config.with_data_dir(dir);
    }
    debug!(app = %config.app, "loading vault");
    Vault::open(config).map_err(|e| format!("Failed to open vault: {}", e))
}

fn prompt(label: &str) -> Result<String, String> {
    rpassword::prompt_password(label).map_err(|e| format!("Password read failed: {}", e))
}

fn password(opts: &ParsedArgs) -> Result<String, String> {
    match &opts.password {
        Some(pw) => Ok(pw.clone()),
        None => prompt("Password: "),
    }
}

fn unlock(vault: &Vault, opts: &ParsedArgs) -> Result<(), String> {
    let session = vault.session();
    if !session.has_setup_password() {
        return Err("No password set. Run 'keyvault init' first.".into());
    }
    if !session.is_locked() {
        return Ok(());
    }
    let pw = password(opts)?;
    forms::submit_unlock(session, &pw).map_err(|e| e.to_string())
}

fn status_json(vault: &Vault) -> Result<Value, String> {
    let session = vault.session();
    let status = session.status().map_err(|e| e.to_string())?;
    let countdown = session.countdown().map_err(|e| e.to_string())?;
    Ok(json!({
        "state": status.state,
        "locked": status.is_locked,
        "initialized": status.has_setup_password,
        "remaining": countdown.formatted(),
        "band": countdown.band(),
        "wallets": vault.wallets().len(),
    }))
}

fn cmd_init(opts: &ParsedArgs) -> Result<Value, String> {
    let vault = load_vault(opts)?;
    if vault.session().has_setup_password() {
        return Err("Password already set".into());
    }

    let (pw, confirm) = match &opts.password {
        Some(pw) => (pw.clone(), pw.clone()),
        None => (prompt("New password: ")?, prompt("Confirm password: ")?),
    };
    forms::submit_setup(vault.session(), &pw, &confirm).map_err(|e| e.to_string())?;

    Ok(json!({
        "status": "initialized",
        "app": vault.config().app,
    }))
}

fn cmd_status(opts: &ParsedArgs) -> Result<Value, String> {
    let vault = load_vault(opts)?;
    status_json(&vault)
}

fn cmd_generate(opts: &ParsedArgs) -> Result<Value, String> {
    let vault = load_vault(opts)?;
    unlock(&vault, opts)?;

    let wallet = vault
        .generate_wallet()
        .map_err(|e| e.to_string())?
        .ok_or("Vault is locked")?;

    Ok(json!({
        "address": wallet.address,
        "created_at": wallet.created_at,
        "explorer": vault.explorer_link(&wallet.address),
        "count": vault.wallets().len(),
    }))
}

fn cmd_list(opts: &ParsedArgs) -> Result<Value, String> {
    let vault = load_vault(opts)?;
    unlock(&vault, opts)?;

    let cards = vault.snapshots().map_err(|e| e.to_string())?;
    let wallets: Vec<Value> = cards
        .iter()
        .map(|card| {
            json!({
                "title": card.title,
                "address": card.address,
                "created": card.created,
                "explorer": card.explorer,
            })
        })
        .collect();

    Ok(json!({"count": wallets.len(), "wallets": wallets}))
}

fn cmd_reveal(opts: &ParsedArgs) -> Result<Value, String> {
    let address = opts.target.as_ref().ok_or("Address required: keyvault reveal <address>")?;
    let vault = load_vault(opts)?;
    unlock(&vault, opts)?;

    let confirmation = match &opts.password {
        Some(pw) => pw.clone(),
        None => prompt("Confirm password: ")?,
    };
    let key = vault.reveal(address, &confirmation).map_err(|e| e.to_string())?;

    Ok(json!({
        "address": address,
        "private_key": key.as_str(),
    }))
}

fn cmd_balance(opts: &ParsedArgs) -> Result<Value, String> {
    let address = opts.target.as_ref().ok_or("Address required: keyvault balance <address>")?;
    let vault = load_vault(opts)?;
    unlock(&vault, opts)?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;
    let state = rt
        .block_on(vault.load_balance(address))
        .map_err(|e| e.to_string())?;
    let card = vault.card(address).map_err(|e| e.to_string())?;

    Ok(json!({
        "address": card.wallet().address,
        "balance": state,
        "display": card.balance().display(&vault.config().network_label),
        "explorer": vault.explorer_link(&card.wallet().address),
    }))
}

fn cmd_repl(opts: &ParsedArgs) -> Result<Value, String> {
    println!("Keyvault REPL - type 'help' or 'quit'\n");

    let vault = load_vault(opts)?;
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;
    let shutdown = Shutdown::new();
    let watcher = {
        let _guard = rt.enter();
        vault.spawn_expiry_watcher(shutdown.subscribe())
    };

    loop {
        let prompt_label = if vault.session().is_locked() { "locked" } else { "keyvault" };
        print!("{}> ", prompt_label);
        io::stdout().flush().ok();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        let session = vault.session();

        match parts.first().copied() {
            Some("quit") | Some("exit") | Some("q") => break,
            Some("help") | Some("?") => {
                println!("Commands:");
                println!("  setup              - Set the vault password");
                println!("  unlock             - Unlock with the password");
                println!("  lock               - Lock now");
                println!("  reset              - Reset the session timer");
                println!("  status             - Session status");
                println!("  watch [seconds]    - Follow the lock countdown");
                println!("  generate           - Create a wallet");
                println!("  list               - List wallets");
                println!("  reveal <address>   - Show a private key");
                println!("  hide <address>     - Hide a revealed key");
                println!("  balance <address>  - Fetch a balance");
                println!("  quit               - Exit");
            }
            Some("setup") => {
                let result = prompt("New password: ").and_then(|pw| {
                    let confirm = prompt("Confirm password: ")?;
                    forms::submit_setup(session, &pw, &confirm).map_err(|e| e.to_string())
                });
                match result {
                    Ok(()) => println!("Password set. Unlocked."),
                    Err(e) => println!("Error: {}", e),
                }
            }
            Some("unlock") => match prompt("Password: ") {
                Ok(pw) => match forms::submit_unlock(session, &pw) {
                    Ok(()) => println!("Unlocked."),
                    Err(e) => println!("Error: {}", e),
                },
                Err(e) => println!("Error: {}", e),
            },
            Some("lock") => match session.lock_app() {
                Ok(true) => println!("Locked."),
                Ok(false) => println!("Already locked."),
                Err(e) => println!("Error: {}", e),
            },
            Some("reset") => match session.reset_timer() {
                Ok(true) => println!("Timer reset."),
                Ok(false) => println!("Locked."),
                Err(e) => println!("Error: {}", e),
            },
            Some("status") => match status_json(&vault) {
                Ok(status) => println!("{}", render(&status, true)),
                Err(e) => println!("Error: {}", e),
            },
            Some("watch") => {
                let secs: u64 = parts.get(1).and_then(|s| s.parse().ok()).unwrap_or(5);
                rt.block_on(watch_countdown(session, secs));
            }
            Some("generate") | Some("new") => match vault.generate_wallet() {
                Ok(Some(wallet)) => println!("{}", wallet.address),
                Ok(None) => println!("Locked. Type 'unlock'."),
                Err(e) => println!("Error: {}", e),
            },
            Some("list") | Some("ls") => {
                if session.is_locked() {
                    println!("Locked. Type 'unlock'.");
                    continue;
                }
                match vault.snapshots() {
                    Ok(cards) => {
                        for card in &cards {
                            println!("{}  {}  {}", card.title, card.address, card.created);
                        }
                        println!("({} wallets)", cards.len());
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            Some("reveal") => {
                let Some(address) = parts.get(1) else {
                    println!("Usage: reveal <address>");
                    continue;
                };
                match prompt("Confirm password: ") {
                    Ok(pw) => match vault.reveal(address, &pw) {
                        Ok(key) => println!("{}", key.as_str()),
                        Err(e) => println!("Error: {}", e),
                    },
                    Err(e) => println!("Error: {}", e),
                }
            }
            Some("hide") => {
                let Some(address) = parts.get(1) else {
                    println!("Usage: hide <address>");
                    continue;
                };
                match vault.hide(address) {
                    Ok(()) => println!("Hidden."),
                    Err(e) => println!("Error: {}", e),
                }
            }
            Some("balance") => {
                let Some(address) = parts.get(1) else {
                    println!("Usage: balance <address>");
                    continue;
                };
                match rt.block_on(vault.load_balance(address)) {
                    Ok(_) => match vault.card(address) {
                        Ok(card) => println!("{}", card.balance().display(&vault.config().network_label)),
                        Err(e) => println!("Error: {}", e),
                    },
                    Err(e) => println!("Error: {}", e),
                }
            }
            Some(cmd) => println!("Unknown: {}. Type 'help'.", cmd),
            None => {}
        }
    }

    rt.block_on(shutdown.trigger());
    watcher.stop();
    println!("Goodbye!");
    Ok(json!({"status": "exited"}))
}

async fn watch_countdown(session: &Session, secs: u64) {
    let stop = Shutdown::new();
    let config = TickerConfig::new().with_until(session.unlocked_till());
    let ticker = Ticker::spawn(config, session.clock(), stop.subscribe());
    let mut ticks = ticker.subscribe();

    for _ in 0..=secs {
        if session.is_locked() {
            println!("Locked.");
            break;
        }
        match session.countdown() {
            Ok(countdown) => println!("{}  {:?}", countdown.formatted(), countdown.band()),
            Err(e) => {
                println!("Error: {}", e);
                break;
            }
        }
        if ticks.changed().await.is_err() {
            break;
        }
    }

    stop.trigger().await;
}

#[cfg(feature = "server")]
fn cmd_serve(opts: &ParsedArgs) -> Result<Value, String> {
    use keyvault::install_signal_handlers;
    use std::sync::Arc;
    use tracing::info;

    let port = opts.port.unwrap_or(8080);
    let vault = load_vault(opts)?;
    let app_name = vault.config().app.clone();
    let vault = Arc::new(vault);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async {
        let shutdown = install_signal_handlers();
        let addr = format!("127.0.0.1:{}", port);

        info!("Endpoints:");
        info!("  GET  /health                     - Health check");
        info!("  GET  /auth/status                - Session status");
        info!("  PUT  /auth/unlock                - Unlock with password");
        info!("  GET  /wallets                    - List wallets");
        debug!("  POST /wallets/:address/reveal    - Reveal private key");

        keyvault::serve(vault, &addr, &app_name, shutdown)
            .await
            .map_err(|e| format!("Server error: {}", e))
    })?;

    Ok(json!({"status": "stopped"}))
}
