use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Client for the query gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "127.0.0.1:8443")]
    addr: String,

    #[arg(short, long, env = "GATEWAY_USER")]
    user: String,

    #[arg(short, long, env = "GATEWAY_PASSWORD")]
    password: String,

    /// Connect without TLS (gateway must run with insecure_plaintext).
    #[arg(long)]
    plaintext: bool,

    /// Name the server certificate is checked against.
    #[arg(long, default_value = "localhost")]
    server_name: String,

    /// CA bundle the server certificate must chain to.
    #[arg(long, required_unless_present = "plaintext")]
    ca: Option<PathBuf>,

    /// Client certificate chain (PEM).
    #[arg(long, required_unless_present = "plaintext")]
    cert: Option<PathBuf>,

    /// Client private key (PEM).
    #[arg(long, required_unless_present = "plaintext")]
    key: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate and print the established identity
    Auth,
    /// Run a query against a collection
    Query {
        collection: String,
        #[arg(long, default_value = "find")]
        action: String,
        /// Filter document as JSON text, e.g. '{"status":"open"}'
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        database: Option<String>,
    },
}

fn request(cli: &Cli) -> Value {
    let mut request = Map::new();
    request.insert("user".into(), json!(cli.user));
    request.insert("password".into(), json!(cli.password));
    match &cli.command {
        Commands::Auth => {
            request.insert("type".into(), json!("auth"));
        }
        Commands::Query {
            collection,
            action,
            filter,
            database,
        } => {
            request.insert("type".into(), json!("query"));
            request.insert("collection".into(), json!(collection));
            request.insert("action".into(), json!(action));
            if let Some(filter) = filter {
                request.insert("filter".into(), json!(filter));
            }
            if let Some(database) = database {
                request.insert("database".into(), json!(database));
            }
        }
    }
    Value::Object(request)
}

fn tls_connector(ca: &PathBuf, cert: &PathBuf, key: &PathBuf) -> Result<TlsConnector, Box<dyn std::error::Error>> {
    let mut roots = RootCertStore::empty();
    for ca_cert in rustls_pemfile::certs(&mut BufReader::new(File::open(ca)?)) {
        roots.add(ca_cert?)?;
    }
    let chain = rustls_pemfile::certs(&mut BufReader::new(File::open(cert)?))
        .collect::<Result<Vec<_>, _>>()?;
    let key = rustls_pemfile::private_key(&mut BufReader::new(File::open(key)?))?
        .ok_or("no private key found")?;

    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_client_auth_cert(chain, key)?;
    Ok(TlsConnector::from(Arc::new(config)))
}

async fn exchange<S>(stream: S, request: &Value) -> Result<Value, Box<dyn std::error::Error>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = tokio::io::BufReader::new(stream);
    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    stream.get_mut().write_all(&line).await?;
    stream.get_mut().flush().await?;

    let mut response = String::new();
    if stream.read_line(&mut response).await? == 0 {
        return Err("gateway closed the connection".into());
    }
    Ok(serde_json::from_str(&response)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let request = request(&cli);
    let tcp = TcpStream::connect(&cli.addr).await?;

    let response = match (cli.plaintext, &cli.ca, &cli.cert, &cli.key) {
        (true, ..) => exchange(tcp, &request).await?,
        (false, Some(ca), Some(cert), Some(key)) => {
            let connector = tls_connector(ca, cert, key)?;
            let server_name = ServerName::try_from(cli.server_name.clone())?;
            let tls = connector.connect(server_name, tcp).await?;
            exchange(tls, &request).await?
        }
        _ => return Err("--ca, --cert and --key are required for TLS".into()),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    if response["status"] != "success" {
        std::process::exit(1);
    }
    Ok(())
}
