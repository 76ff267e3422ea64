//! Topology types.

use crate::{TopologyError, TopologyResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Role a service plays for the web process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Database,
    Cache,
    MailCapture,
    Web,
    Other,
}

impl ServiceKind {
    /// Classify a service from its name and image.
    ///
    /// The image is checked first; locally built images are often named
    /// after the project (`travelmate_backend_local_postgres`), so the
    /// database/cache/mail markers are looked for before the web ones.
    pub fn infer(name: &str, image: Option<&str>) -> Self {
        let haystacks = [image.unwrap_or_default().to_ascii_lowercase(), name.to_ascii_lowercase()];

        const DATABASE: &[&str] = &["postgres", "postgis", "mysql", "mariadb"];
        const CACHE: &[&str] = &["redis", "valkey", "memcached"];
        const MAIL: &[&str] = &["mailpit", "mailhog", "mailcatcher", "maildev"];
        const WEB: &[&str] = &["django", "web", "api", "gunicorn", "uvicorn"];

        for haystack in &haystacks {
            let has = |markers: &[&str]| markers.iter().any(|m| haystack.contains(m));
            if has(DATABASE) {
                return ServiceKind::Database;
            }
            if has(CACHE) {
                return ServiceKind::Cache;
            }
            if has(MAIL) {
                return ServiceKind::MailCapture;
            }
            if has(WEB) {
                return ServiceKind::Web;
            }
        }
        ServiceKind::Other
    }

    /// Port the service conventionally listens on inside the network.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            ServiceKind::Database => Some(5432),
            ServiceKind::Cache => Some(6379),
            ServiceKind::MailCapture => Some(1025),
            ServiceKind::Web => Some(8000),
            ServiceKind::Other => None,
        }
    }
}

/// Condition attached to a `depends_on` edge.
///
/// Recorded for reporting only: readiness is always established by probing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCondition {
    #[default]
    Started,
    Healthy,
    CompletedSuccessfully,
}

impl DependencyCondition {
    pub(crate) fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("service_healthy") => DependencyCondition::Healthy,
            Some("service_completed_successfully") => DependencyCondition::CompletedSuccessfully,
            _ => DependencyCondition::Started,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependsOn {
    pub service: String,
    pub condition: DependencyCondition,
}

/// A published or exposed port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub host_ip: Option<String>,
    pub published: Option<u16>,
    pub target: u16,
}

impl PortMapping {
    /// Parse the compose short syntax: `"8000"`, `"8000:8000"`,
    /// `"127.0.0.1:8025:8025"`, optionally suffixed with `/tcp` or `/udp`.
    pub fn parse(service: &str, spec: &str) -> TopologyResult<Self> {
        let invalid = || TopologyError::InvalidPort {
            service: service.to_string(),
            spec: spec.to_string(),
        };
        let without_proto = spec.split('/').next().unwrap_or(spec).trim();
        let port = |raw: &str| raw.parse::<u16>().map_err(|_| invalid());

        let parts: Vec<&str> = without_proto.rsplitn(3, ':').collect();
        match parts.as_slice() {
            [target] => Ok(Self {
                host_ip: None,
                published: None,
                target: port(target)?,
            }),
            [target, published] => Ok(Self {
                host_ip: None,
                published: Some(port(published)?),
                target: port(target)?,
            }),
            [target, published, host_ip] => Ok(Self {
                host_ip: Some(host_ip.to_string()),
                published: Some(port(published)?),
                target: port(target)?,
            }),
            _ => Err(invalid()),
        }
    }
}

/// One service of the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub name: String,
    pub image: Option<String>,
    pub kind: ServiceKind,
    pub depends_on: Vec<DependsOn>,
    pub ports: Vec<PortMapping>,
    pub env_files: Vec<String>,
    pub profiles: Vec<String>,
    pub command: Option<Vec<String>>,
}

impl Service {
    /// A service with no ports, profiles or dependencies.
    pub fn new(name: impl Into<String>, image: Option<&str>) -> Self {
        let name = name.into();
        Self {
            kind: ServiceKind::infer(&name, image),
            name,
            image: image.map(str::to_string),
            depends_on: Vec::new(),
            ports: Vec::new(),
            env_files: Vec::new(),
            profiles: Vec::new(),
            command: None,
        }
    }

    pub fn depending_on(mut self, service: &str) -> Self {
        self.depends_on.push(DependsOn {
            service: service.to_string(),
            condition: DependencyCondition::Started,
        });
        self
    }

    /// Port to probe from inside the compose network.
    pub fn probe_port(&self) -> Option<u16> {
        self.kind
            .default_port()
            .or_else(|| self.ports.first().map(|p| p.target))
    }
}

/// The set of services and their dependency edges.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub(crate) services: BTreeMap<String, Service>,
    pub(crate) active_profiles: BTreeSet<String>,
}

impl Topology {
    pub fn new(services: impl IntoIterator<Item = Service>) -> Self {
        Self {
            services: services.into_iter().map(|s| (s.name.clone(), s)).collect(),
            active_profiles: BTreeSet::new(),
        }
    }

    /// The stack used when no compose file is configured: database, cache
    /// and mail capture, with `django` depending on all three.
    pub fn default_web_stack() -> Self {
        Self::new([
            Service::new("postgres", Some("postgis/postgis:16-3.4")),
            Service::new("redis", Some("redis:6")),
            Service::new("mailpit", Some("axllent/mailpit:latest")),
            Service::new("django", None)
                .depending_on("postgres")
                .depending_on("redis")
                .depending_on("mailpit"),
        ])
    }

    /// Activate compose profiles; services listing one of them become enabled.
    pub fn with_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_profiles.extend(profiles.into_iter().map(Into::into));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn is_enabled(&self, service: &Service) -> bool {
        service.profiles.is_empty()
            || service.profiles.iter().any(|p| self.active_profiles.contains(p))
    }

    /// Enabled services, sorted by name.
    pub fn enabled_services(&self) -> impl Iterator<Item = &Service> {
        self.services.values().filter(|s| self.is_enabled(s))
    }

    /// Services switched off by profiles, sorted by name.
    pub fn disabled_services(&self) -> impl Iterator<Item = &Service> {
        self.services.values().filter(|s| !self.is_enabled(s))
    }
}
