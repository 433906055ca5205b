use arc_swap::ArcSwap;
use clap::{Arg, ArgMatches, Command};
use configuration::ProxyConfig;
use forwarder::TcpForwarder;
use log::{error, info};
use server::SharedData;
use std::{
  error::Error,
  net::{IpAddr, SocketAddr},
  path::PathBuf,
  sync::Arc,
};
use tracker::PeerRegistry;

mod configuration;
mod error_response;
mod forwarder;
mod host_key;
mod load_balancing;
mod logging;
mod peer;
mod request;
mod routing;
mod server;
mod tracker;

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn Error>> {
  let matches = cli().get_matches();
  let _logging = logging::initialize()?;

  let result = match matches.subcommand() {
    Some(("proxy", args)) => run_proxy(args).await,
    Some(("tracker", args)) => run_tracker(args).await,
    Some(("peer", args)) => run_peer(args).await,
    _ => unreachable!("clap requires a subcommand"),
  };
  if let Err(e) = &result {
    error!("{}", e);
  }
  result
}

fn cli() -> Command<'static> {
  Command::new("hostname-proxy")
    .about("Hostname based HTTP reverse proxy with a peer tracker")
    .subcommand_required(true)
    .arg_required_else_help(true)
    .subcommand(
      Command::new("proxy")
        .about("Forwards requests to backends chosen by their Host header")
        .arg(
          Arg::new("config")
            .short('c')
            .long("config")
            .takes_value(true)
            .default_value("config.toml")
            .help("Routing configuration file, reloaded when it changes"),
        )
        .arg(
          Arg::new("listen")
            .short('l')
            .long("listen")
            .takes_value(true)
            .help("Address to listen on, overrides `listen` from the configuration"),
        ),
    )
    .subcommand(
      Command::new("tracker")
        .about("Keeps the list of chat peers")
        .arg(address_arg("ip", "0.0.0.0"))
        .arg(port_arg("8000")),
    )
    .subcommand(
      Command::new("peer")
        .about("Chats directly with other peers")
        .arg(
          Arg::new("name")
            .long("name")
            .takes_value(true)
            .default_value("peer1"),
        )
        .arg(address_arg("ip", "127.0.0.1"))
        .arg(port_arg("9001")),
    )
}

fn address_arg(name: &'static str, default: &'static str) -> Arg<'static> {
  Arg::new(name)
    .long(name)
    .takes_value(true)
    .default_value(default)
    .validator(|value| value.parse::<IpAddr>())
}

fn port_arg(default: &'static str) -> Arg<'static> {
  Arg::new("port")
    .short('p')
    .long("port")
    .takes_value(true)
    .default_value(default)
    .validator(|value| value.parse::<u16>())
}

fn socket_address(args: &ArgMatches) -> Result<SocketAddr, clap::Error> {
  let ip: IpAddr = args.value_of_t("ip")?;
  let port: u16 = args.value_of_t("port")?;
  Ok(SocketAddr::new(ip, port))
}

async fn run_proxy(args: &ArgMatches) -> Result<(), Box<dyn Error>> {
  let config_path = PathBuf::from(args.value_of("config").unwrap_or("config.toml"));
  let config = ProxyConfig::load(&config_path)?;
  let listen = match args.value_of("listen") {
    Some(listen) => listen.parse::<SocketAddr>()?,
    None => config.listen,
  };

  let routing_table = Arc::new(ArcSwap::from_pointee(config.routing_table));
  // dropping this would stop the config watcher
  let _watcher = configuration::watch(config_path, routing_table.clone())?;

  let shared_data = Arc::new(SharedData::new(routing_table, Arc::new(TcpForwarder::new())));
  server::create(listen, config.backlog, shared_data).await?;
  Ok(())
}

async fn run_tracker(args: &ArgMatches) -> Result<(), Box<dyn Error>> {
  let address = socket_address(args)?;
  info!("Starting tracker on {}", address);
  tracker::run(address, Arc::new(PeerRegistry::new())).await?;
  Ok(())
}

async fn run_peer(args: &ArgMatches) -> Result<(), Box<dyn Error>> {
  let address = socket_address(args)?;
  let name = args.value_of("name").unwrap_or("peer1").to_string();
  peer::run(name, address).await?;
  Ok(())
}
