//! Port-scan worker (nmap, one-shot).
//!
//! One worker process per target: the supervisor forks one of these for
//! each host it wants scanned and the process exits after its single
//! request. nmap runs a SYN+UDP scan with aggressive timing over the top
//! N ports, host discovery skipped, greppable output on stdout.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{RequestContext, Worker};
use crate::error::WorkerError;
use crate::exec::run_command;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortScanParams {
    #[serde(default)]
    pub target: String,

    #[serde(default = "default_top_ports")]
    pub top_ports: u16,
}

const fn default_top_ports() -> u16 {
    1000
}

/// One open port extracted from greppable output.
#[derive(Debug, PartialEq, Eq)]
struct OpenPort {
    port: u16,
    protocol: String,
    service: String,
}

/// One-shot worker wrapping the port scanner.
pub struct PortScanWorker;

#[async_trait]
impl Worker for PortScanWorker {
    type Params = PortScanParams;

    const KIND: &'static str = "portscan";

    fn one_shot(&self) -> bool {
        true
    }

    async fn run(
        &self,
        ctx: &mut RequestContext,
        params: PortScanParams,
    ) -> Result<Value, WorkerError> {
        if params.target.is_empty() {
            return Err(WorkerError::Validation("No target received".into()));
        }

        let config = ctx.config();
        let args = vec![
            "-sS".to_string(),
            "-sU".to_string(),
            "-T4".to_string(),
            "--top-ports".to_string(),
            params.top_ports.to_string(),
            "-Pn".to_string(),
            "-oG".to_string(),
            "-".to_string(),
            params.target.clone(),
        ];

        let output = run_command(&config.tools.nmap, &args, config.limits.nmap).await?;

        let open_ports = parse_greppable(&String::from_utf8_lossy(&output.stdout));
        let ports: Vec<Value> = open_ports
            .into_iter()
            .map(|p| {
                json!({
                    "port": p.port,
                    "protocol": p.protocol,
                    "service": p.service,
                })
            })
            .collect();

        Ok(json!({ "target": params.target, "openPorts": ports }))
    }
}

/// Extract open-port entries from greppable `Ports:` lines.
///
/// Entries look like `80/open/tcp//http//`; only the exact `open` state
/// counts (not `open|filtered`).
fn parse_greppable(text: &str) -> Vec<OpenPort> {
    static ENTRY: OnceLock<Regex> = OnceLock::new();
    let entry = ENTRY.get_or_init(|| {
        Regex::new(r"(\d+)/open/([a-z]+)/[^/,]*/([^/,]*)/").unwrap()
    });

    let mut ports = Vec::new();
    for line in text.lines() {
        if !line.contains("Ports:") {
            continue;
        }
        for caps in entry.captures_iter(line) {
            let Ok(port) = caps[1].parse::<u16>() else {
                continue;
            };
            ports.push(OpenPort {
                port,
                protocol: caps[2].to_string(),
                service: caps[3].to_string(),
            });
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::test_context;

    const GREPPABLE: &str = "\
# Nmap 7.94 scan initiated\n\
Host: 192.0.2.10 (a.example.com)\tStatus: Up\n\
Host: 192.0.2.10 (a.example.com)\tPorts: 80/open/tcp//http//, 443/open/tcp//https//, 53/open|filtered/udp//domain//, 22/closed/tcp//ssh//\n\
# Nmap done\n";

    #[test]
    fn extracts_only_open_entries() {
        let ports = parse_greppable(GREPPABLE);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].port, 80);
        assert_eq!(ports[0].protocol, "tcp");
        assert_eq!(ports[0].service, "http");
        assert_eq!(ports[1].port, 443);
    }

    #[test]
    fn no_ports_line_is_empty() {
        assert!(parse_greppable("# Nmap done\n").is_empty());
        assert!(parse_greppable("").is_empty());
    }

    #[tokio::test]
    async fn missing_target_is_validation_error() {
        let root = tempfile::tempdir().unwrap();
        let mut ctx = test_context(root.path());
        let err = PortScanWorker
            .run(
                &mut ctx,
                PortScanParams {
                    target: String::new(),
                    top_ports: 1000,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No target received");
    }

    #[test]
    fn params_default_top_ports() {
        let params: PortScanParams =
            serde_json::from_str(r#"{"target":"a.example.com"}"#).unwrap();
        assert_eq!(params.top_ports, 1000);
    }

    #[test]
    fn worker_is_one_shot() {
        assert!(PortScanWorker.one_shot());
    }
}
