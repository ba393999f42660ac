//! A minimal bridge runner: wires one local switch device to a peer over
//! TCP (spec §4.6, §6). Stands in for the distillation's dropped
//! command-line harnesses, grounded in `original_source/utils/runlimpet.py`
//! (a client/server Limpet launcher taking `-server`/`-client`, an address,
//! a network id and a message pattern on the command line) -- this binary
//! keeps the same handful of flags and nothing more, since a general CLI
//! framework is explicitly out of scope (spec.md §1 non-goals) and the
//! teacher itself carries no CLI-argument dependency.
//!
//! ```text
//! bridged --listen 127.0.0.1:7887 --network-id 2
//! bridged --connect 127.0.0.1:7887 --network-id 1 --subscribe '$.*'
//! ```

use std::net::{TcpListener, TcpStream};
use std::process;

use kswitch::bridge::{Bridge, BridgeConfig};
use kswitch::{Limits, Mode, Switch};

struct Args {
    listen: Option<String>,
    connect: Option<String>,
    network_id: u32,
    subscribe: String,
    poison: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut listen = None;
    let mut connect = None;
    let mut network_id = None;
    let mut subscribe = "$.*".to_owned();
    let mut poison = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = || it.next().ok_or_else(|| format!("{} needs a value", arg));
        match arg.as_str() {
            "--listen" => listen = Some(value()?),
            "--connect" => connect = Some(value()?),
            "--network-id" => {
                network_id = Some(value()?.parse::<u32>().map_err(|e| e.to_string())?)
            }
            "--subscribe" => subscribe = value()?,
            "--poison" => poison = Some(value()?),
            other => return Err(format!("unrecognised argument: {}", other)),
        }
    }

    let network_id = network_id.ok_or("--network-id is required (must be nonzero)")?;
    if network_id == 0 {
        return Err("--network-id must be nonzero".to_owned());
    }
    if listen.is_some() == connect.is_some() {
        return Err("exactly one of --listen or --connect is required".to_owned());
    }

    Ok(Args {
        listen,
        connect,
        network_id,
        subscribe,
        poison,
    })
}

fn run() -> Result<(), String> {
    let args = parse_args()?;

    let stream = match (&args.listen, &args.connect) {
        (Some(addr), None) => {
            let listener = TcpListener::bind(addr).map_err(|e| e.to_string())?;
            log::info!("listening on {}, waiting for peer", addr);
            let (stream, peer) = listener.accept().map_err(|e| e.to_string())?;
            log::info!("peer connected from {}", peer);
            stream
        }
        (None, Some(addr)) => {
            log::info!("connecting to peer at {}", addr);
            TcpStream::connect(addr).map_err(|e| e.to_string())?
        }
        _ => unreachable!("validated above"),
    };

    let switch = Switch::new(Limits::default());
    let handle = switch.open(0, Mode::ReadWrite).map_err(|e| e.to_string())?;

    let config = BridgeConfig {
        our_network_id: args.network_id,
        subscribe_pattern: args.subscribe,
        poison: args.poison,
    };

    let bridge = Bridge::connect(handle, config, stream).map_err(|e| e.to_string())?;
    bridge.run().map_err(|e| e.to_string())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("bridged: {}", e);
        process::exit(1);
    }
}
