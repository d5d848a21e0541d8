use facet::Facet;
use figue as args;
use sightline_runtime::{
    Backend, ClientConfig, ENV_API_KEY, ENV_ENDPOINT, ENV_SERVICE_NAME, ENV_USE_SSL, HttpBackend,
    SecurityScanner, resolve_endpoint,
};
use sightline_types::{ActiveBreakpoints, AutoRegistration, SecurityFlag, ValueMap};
use std::io::Read;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Facet)]
struct ScanReport {
    variables: ValueMap,
    security_flags: Vec<SecurityFlag>,
}

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    #[facet(args::subcommand)]
    command: Command,
}

#[derive(Facet, Debug)]
#[repr(u8)]
enum Command {
    /// List the breakpoints the control plane currently serves for a service.
    Active {
        #[facet(args::named, default)]
        endpoint: Option<String>,
        #[facet(args::named, default)]
        api_key: Option<String>,
        #[facet(args::named, default)]
        service: Option<String>,
        #[facet(args::named, default)]
        ssl: bool,
    },
    /// Register a capture site by hand.
    Register {
        #[facet(args::named, default)]
        endpoint: Option<String>,
        #[facet(args::named, default)]
        api_key: Option<String>,
        #[facet(args::named, default)]
        service: Option<String>,
        #[facet(args::named, default)]
        ssl: bool,
        #[facet(args::named)]
        file: String,
        #[facet(args::named)]
        line: u32,
        #[facet(args::named, default)]
        function: Option<String>,
        #[facet(args::named, default)]
        label: Option<String>,
    },
    /// Run the security scanner over a JSON object (`--json` or stdin).
    Scan {
        #[facet(args::named, default)]
        json: Option<String>,
    },
    /// Print the base URL an endpoint resolves to.
    Resolve {
        #[facet(args::named)]
        endpoint: String,
        #[facet(args::named, default)]
        path: Option<String>,
        #[facet(args::named, default)]
        ssl: bool,
    },
}

/// Connection flags, layered over `SIGHTLINE_*` environment variables.
struct Connection {
    endpoint: Option<String>,
    api_key: Option<String>,
    service: Option<String>,
    ssl: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("sightline")
                .description("Inspect and exercise a sightline control plane")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();
    let cli = args::Driver::new(figue_config)
        .run()
        .into_result()
        .map_err(|e| e.to_string())?;

    match cli.value.command {
        Command::Active {
            endpoint,
            api_key,
            service,
            ssl,
        } => run_active(Connection {
            endpoint,
            api_key,
            service,
            ssl,
        }),
        Command::Register {
            endpoint,
            api_key,
            service,
            ssl,
            file,
            line,
            function,
            label,
        } => run_register(
            Connection {
                endpoint,
                api_key,
                service,
                ssl,
            },
            file,
            line,
            function.unwrap_or_default(),
            label.unwrap_or_default(),
        ),
        Command::Scan { json } => run_scan(json),
        Command::Resolve {
            endpoint,
            path,
            ssl,
        } => {
            println!("{}", resolve_endpoint(&endpoint, path.as_deref().unwrap_or(""), ssl));
            Ok(())
        }
    }
}

fn load_config<F>(conn: &Connection, env: F) -> Result<ClientConfig, String>
where
    F: Fn(&str) -> Option<String>,
{
    ClientConfig::from_lookup(|key| {
        let flag = match key {
            ENV_ENDPOINT => conn.endpoint.clone(),
            ENV_API_KEY => conn.api_key.clone(),
            ENV_SERVICE_NAME => conn.service.clone(),
            ENV_USE_SSL if conn.ssl => Some("true".to_string()),
            _ => None,
        };
        flag.or_else(|| env(key))
    })
    .map_err(|e| format!("configuration: {e}"))
}

fn backend(config: &ClientConfig) -> HttpBackend {
    let base_url = config.base_url();
    debug!(%base_url, "using control plane");
    HttpBackend::new(base_url, config.api_key.clone(), config.request_timeout)
}

fn run_active(conn: Connection) -> Result<(), String> {
    let config = load_config(&conn, |key| std::env::var(key).ok())?;
    let breakpoints = backend(&config)
        .fetch_active(&config.service_name)
        .map_err(|e| e.to_string())?;
    info!(service = %config.service_name, breakpoints = breakpoints.len(), "fetched active breakpoints");

    let pretty = facet_json::to_string_pretty(&ActiveBreakpoints::new(breakpoints))
        .map_err(|e| format!("encode breakpoints: {e}"))?;
    println!("{pretty}");
    Ok(())
}

fn run_register(
    conn: Connection,
    file_path: String,
    line_number: u32,
    function_name: String,
    label: String,
) -> Result<(), String> {
    let config = load_config(&conn, |key| std::env::var(key).ok())?;
    let registration = AutoRegistration {
        service_name: config.service_name.clone(),
        file_path,
        line_number,
        function_name,
        label,
    };
    backend(&config)
        .auto_register(&registration)
        .map_err(|e| e.to_string())?;
    info!(
        file = %registration.file_path,
        line = registration.line_number,
        "registered capture site"
    );
    Ok(())
}

fn run_scan(json: Option<String>) -> Result<(), String> {
    let input = match json {
        Some(json) => json,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| format!("read stdin: {e}"))?;
            buf
        }
    };
    let report = scan_report(&input)?;
    let pretty = facet_json::to_string_pretty(&report).map_err(|e| format!("encode scan result: {e}"))?;
    println!("{pretty}");
    Ok(())
}

fn scan_report(input: &str) -> Result<ScanReport, String> {
    let variables: ValueMap =
        facet_json::from_str(input).map_err(|e| format!("decode variables as a JSON object: {e}"))?;
    let result = SecurityScanner.scan(&variables);
    Ok(ScanReport {
        variables: result.variables,
        security_flags: result.flags,
    })
}
