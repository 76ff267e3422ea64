//! Compose file parsing.

use crate::model::{DependencyCondition, DependsOn, PortMapping, Service, ServiceKind, Topology};
use crate::{TopologyError, TopologyResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, RawService>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    image: Option<String>,
    #[serde(default)]
    depends_on: RawDependsOn,
    #[serde(default)]
    ports: Vec<RawPort>,
    #[serde(default)]
    env_file: RawStringList,
    #[serde(default)]
    profiles: Vec<String>,
    command: Option<RawCommand>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependsOn {
    List(Vec<String>),
    Map(BTreeMap<String, RawDependency>),
}

impl Default for RawDependsOn {
    fn default() -> Self {
        RawDependsOn::List(Vec::new())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawDependency {
    condition: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPort {
    Number(u16),
    Short(String),
    Long {
        target: u16,
        published: Option<RawPublished>,
        host_ip: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawPublished {
    Number(u16),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStringList {
    One(String),
    Many(Vec<String>),
}

impl Default for RawStringList {
    fn default() -> Self {
        RawStringList::Many(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCommand {
    Shell(String),
    Exec(Vec<String>),
}

impl Topology {
    /// Parse a compose document.
    pub fn from_compose_str(document: &str) -> TopologyResult<Self> {
        let compose: ComposeFile = serde_yaml::from_str(document)?;

        let mut services = Vec::with_capacity(compose.services.len());
        for (name, raw) in compose.services {
            services.push(convert_service(name, raw)?);
        }

        debug!(count = services.len(), "Parsed compose services");
        Ok(Topology::new(services))
    }

    /// Read and parse a compose file.
    pub fn from_compose_file(path: &Path) -> TopologyResult<Self> {
        let document = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_compose_str(&document)
    }
}

fn convert_service(name: String, raw: RawService) -> TopologyResult<Service> {
    let depends_on = match raw.depends_on {
        RawDependsOn::List(names) => names
            .into_iter()
            .map(|service| DependsOn {
                service,
                condition: DependencyCondition::Started,
            })
            .collect(),
        RawDependsOn::Map(entries) => entries
            .into_iter()
            .map(|(service, dep)| DependsOn {
                service,
                condition: DependencyCondition::parse(dep.condition.as_deref()),
            })
            .collect(),
    };

    let ports = raw
        .ports
        .into_iter()
        .map(|port| convert_port(&name, port))
        .collect::<TopologyResult<Vec<_>>>()?;

    let env_files = match raw.env_file {
        RawStringList::One(file) => vec![file],
        RawStringList::Many(files) => files,
    };

    let command = raw.command.map(|command| match command {
        RawCommand::Shell(line) => line.split_whitespace().map(str::to_string).collect(),
        RawCommand::Exec(argv) => argv,
    });

    Ok(Service {
        kind: ServiceKind::infer(&name, raw.image.as_deref()),
        image: raw.image,
        depends_on,
        ports,
        env_files,
        profiles: raw.profiles,
        command,
        name,
    })
}

fn convert_port(service: &str, port: RawPort) -> TopologyResult<PortMapping> {
    match port {
        RawPort::Number(target) => Ok(PortMapping {
            host_ip: None,
            published: None,
            target,
        }),
        RawPort::Short(spec) => PortMapping::parse(service, &spec),
        RawPort::Long {
            target,
            published,
            host_ip,
        } => {
            let published = match published {
                None => None,
                Some(RawPublished::Number(port)) => Some(port),
                Some(RawPublished::Text(text)) => Some(text.parse::<u16>().map_err(|_| {
                    TopologyError::InvalidPort {
                        service: service.to_string(),
                        spec: text.clone(),
                    }
                })?),
            };
            Ok(PortMapping {
                host_ip,
                published,
                target,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL_COMPOSE: &str = r#"
volumes:
  travelmate_backend_local_postgres_data: {}

services:
  django:
    build:
      context: .
      dockerfile: ./compose/local/django/Dockerfile
    image: travelmate_backend_local_django
    depends_on:
      - postgres
      - redis
      - mailpit
    volumes:
      - .:/app:z
    env_file:
      - ./.envs/.local/.django
      - ./.envs/.local/.postgres
    ports:
      - "8000:8000"
    command: /start

  postgres:
    image: travelmate_backend_production_postgres
    env_file: ./.envs/.local/.postgres

  mailpit:
    image: docker.io/axllent/mailpit:latest
    ports:
      - "8025:8025"

  redis:
    image: docker.io/redis:6

  celeryworker:
    image: travelmate_backend_local_celeryworker
    depends_on:
      redis:
        condition: service_started
      postgres:
        condition: service_healthy
    profiles: ["workers"]
    command: ["/start-celeryworker"]
"#;

    #[test]
    fn parses_local_stack() {
        let topology = Topology::from_compose_str(LOCAL_COMPOSE).unwrap();

        let django = topology.get("django").unwrap();
        assert_eq!(django.kind, ServiceKind::Web);
        assert_eq!(django.env_files.len(), 2);
        assert_eq!(django.ports[0].published, Some(8000));
        assert_eq!(django.command, Some(vec!["/start".to_string()]));
        let deps: Vec<_> = django.depends_on.iter().map(|d| d.service.as_str()).collect();
        assert_eq!(deps, vec!["postgres", "redis", "mailpit"]);

        let postgres = topology.get("postgres").unwrap();
        assert_eq!(postgres.kind, ServiceKind::Database);
        assert_eq!(postgres.env_files, vec!["./.envs/.local/.postgres".to_string()]);

        assert_eq!(topology.get("mailpit").unwrap().kind, ServiceKind::MailCapture);
    }

    #[test]
    fn map_form_depends_on_keeps_conditions() {
        let topology = Topology::from_compose_str(LOCAL_COMPOSE).unwrap();
        let worker = topology.get("celeryworker").unwrap();

        let postgres = worker.depends_on.iter().find(|d| d.service == "postgres").unwrap();
        assert_eq!(postgres.condition, DependencyCondition::Healthy);
        assert_eq!(worker.profiles, vec!["workers".to_string()]);
        assert!(!topology.is_enabled(worker));
    }

    #[test]
    fn long_port_syntax() {
        let topology = Topology::from_compose_str(
            r#"
services:
  mailpit:
    image: axllent/mailpit
    ports:
      - target: 8025
        published: "8025"
        host_ip: 127.0.0.1
      - 1025
"#,
        )
        .unwrap();
        let ports = &topology.get("mailpit").unwrap().ports;
        assert_eq!(ports[0].published, Some(8025));
        assert_eq!(ports[0].host_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(ports[1].target, 1025);
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docker-compose.local.yml");
        std::fs::write(&path, LOCAL_COMPOSE).unwrap();

        let topology = Topology::from_compose_file(&path).unwrap();
        assert_eq!(topology.enabled_services().count(), 4);

        let missing = Topology::from_compose_file(&dir.path().join("missing.yml"));
        assert!(matches!(missing, Err(TopologyError::Io { .. })));
    }

    #[test]
    fn shipped_compose_file_orders_backing_services_first() {
        let topology = Topology::from_compose_str(include_str!("../../../deploy/docker-compose.yml")).unwrap();

        let order: Vec<_> = topology.startup_order().unwrap().into_iter().map(|s| s.name.as_str()).collect();
        assert_eq!(order, vec!["mailpit", "postgres", "redis", "django"]);

        let disabled: Vec<_> = topology.disabled_services().map(|s| s.name.as_str()).collect();
        assert_eq!(disabled, vec!["celerybeat", "celeryworker", "flower"]);

        let with_workers = topology.with_profiles(["workers"]);
        assert_eq!(with_workers.startup_order().unwrap().len(), 6);
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let result = Topology::from_compose_str("services: [not, a, map]");
        assert!(matches!(result, Err(TopologyError::Parse(_))));
    }
}
