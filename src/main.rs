// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bootstrap for the `lockserverd` binary: parse CLI flags, init logging,
//! bind, publish the discovery file, and run.

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use lockserver::config::Opts;
use lockserver::discovery;
use lockserver::server::Server;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let opts = Opts::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&opts.log_level))
        .init();

    let advertised_host = match &opts.host {
        Some(host) => host.clone(),
        None => match local_ip_address::local_ip() {
            Ok(ip) => ip.to_string(),
            Err(e) => {
                tracing::error!(error = %e, "could not detect outward-facing IP");
                return ExitCode::FAILURE;
            }
        },
    };

    let bind_host = opts.host.clone().unwrap_or_else(|| "0.0.0.0".to_owned());
    let bind_addr: SocketAddr = match format!("{bind_host}:{}", opts.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, host = %bind_host, "invalid bind address");
            return ExitCode::FAILURE;
        }
    };

    let mut server = match Server::bind(bind_addr) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, %bind_addr, "failed to bind listening socket");
            return ExitCode::FAILURE;
        }
    };

    let local_addr = match server.local_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "failed to read back bound address");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = discovery::write(Path::new(&opts.discovery_file), &advertised_host, local_addr.port()) {
        tracing::error!(error = %e, path = ?opts.discovery_file, "failed to write discovery file");
        return ExitCode::FAILURE;
    }

    tracing::info!(
        host = %advertised_host,
        bind = %bind_addr,
        port = local_addr.port(),
        discovery_file = ?opts.discovery_file,
        "lockserverd ready"
    );

    match server.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "listening socket failed, shutting down");
            ExitCode::FAILURE
        }
    }
}
