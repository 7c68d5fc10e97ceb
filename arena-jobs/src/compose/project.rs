//! Compose project descriptors
//!
//! A compose file model, serialised as JSON and piped to `docker compose`
//! (JSON is valid YAML, so no YAML encoder is needed).

use arena_core::domain::game::{Game, GameType, Project};
use arena_core::domain::request::{builder_project_name, game_project_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::Settings;

const CONTAINER_PORT: &str = "9000";

const GAME_RUNNER_SERVICE: &str = "game-runner";
const TEAM_RUNNER_PREFIX: &str = "team-runner-";
const BUILDER_SERVICE: &str = "game-type-builder";

/// Network and volume keys inside the compose file
const SHARED_NETWORK: &str = "cgp";
const LOCAL_STORE: &str = "localstore";

const DOCKER_SOCK_PATH: &str = "/var/run/docker.sock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeProject {
    pub name: String,
    pub services: BTreeMap<String, Service>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, ExternalResource>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, ExternalResource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, ServiceNetwork>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub privileged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceNetwork {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
}

/// A network or volume created outside this project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalResource {
    pub external: bool,
    pub name: String,
}

impl ComposeProject {
    fn new(settings: &Settings, name: String) -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            SHARED_NETWORK.to_string(),
            ExternalResource {
                external: true,
                name: settings.compose_network.clone(),
            },
        );

        let mut volumes = BTreeMap::new();
        volumes.insert(
            LOCAL_STORE.to_string(),
            ExternalResource {
                external: true,
                name: settings.local_store_volume.clone(),
            },
        );

        Self {
            name,
            services: BTreeMap::new(),
            networks,
            volumes,
        }
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }
}

impl Service {
    /// Value of an environment entry, if set
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment
            .iter()
            .find_map(|entry| entry.strip_prefix(key)?.strip_prefix('='))
    }
}

/// Game project: one game runner plus a team runner per project
pub fn game_project(settings: &Settings, game: &Game, projects: &[Project]) -> ComposeProject {
    let mut project = ComposeProject::new(settings, game_project_name(game.id));

    for proj in projects {
        project
            .services
            .insert(team_runner_name(proj.id), team_runner(settings, game, proj));
    }
    project
        .services
        .insert(GAME_RUNNER_SERVICE.to_string(), game_runner(settings, game));

    project
}

/// Game type builder project
pub fn builder_project(settings: &Settings, game_type: &GameType) -> ComposeProject {
    let mut project = ComposeProject::new(settings, builder_project_name(game_type.id));

    let mut environment = shared_env(settings);
    environment.push(format!("GAME_TYPE_ID={}", game_type.id));

    let mut networks = BTreeMap::new();
    networks.insert(SHARED_NETWORK.to_string(), ServiceNetwork::default());

    project.services.insert(
        BUILDER_SERVICE.to_string(),
        Service {
            image: settings.image(BUILDER_SERVICE),
            ports: Vec::new(),
            environment,
            networks,
            volumes: vec![
                local_store_volume(settings),
                format!("{}:{}", DOCKER_SOCK_PATH, DOCKER_SOCK_PATH),
            ],
            privileged: true,
        },
    );

    project
}

fn game_runner(settings: &Settings, game: &Game) -> Service {
    let mut environment = shared_env(settings);
    environment.push(format!("GAME_ID={}", game.id));
    environment.push(format!("POD_IP={}", GAME_RUNNER_SERVICE));

    Service {
        image: settings.image(&format!("game-runner-{}", game.game_type_id)),
        ports: vec![CONTAINER_PORT.to_string()],
        environment,
        networks: default_networks(),
        volumes: vec![local_store_volume(settings)],
        privileged: false,
    }
}

fn team_runner(settings: &Settings, game: &Game, project: &Project) -> Service {
    let mut environment = shared_env(settings);
    environment.push(format!("GAME_ID={}", game.id));
    environment.push(format!("PROJECT_ID={}", project.id));
    environment.push(format!("POD_IP={}", team_runner_name(project.id)));

    let mut volumes = vec![local_store_volume(settings)];
    // Local projects get their source checkout mounted directly
    if let Some(directory) = project.directory.as_deref().filter(|d| !d.is_empty()) {
        volumes.push(format!("{}:{}", directory, settings.source_path));
    }

    Service {
        image: settings.image(&format!(
            "{}{}-{}",
            TEAM_RUNNER_PREFIX, game.game_type_id, project.language
        )),
        ports: vec![CONTAINER_PORT.to_string()],
        environment,
        networks: default_networks(),
        volumes,
        privileged: false,
    }
}

fn team_runner_name(project_id: i64) -> String {
    format!("{}{}", TEAM_RUNNER_PREFIX, project_id)
}

fn local_store_volume(settings: &Settings) -> String {
    format!("{}:{}", LOCAL_STORE, settings.local_store_path)
}

/// Project default network plus the shared one, where the datastore emulator lives
fn default_networks() -> BTreeMap<String, ServiceNetwork> {
    let mut networks = BTreeMap::new();
    networks.insert("default".to_string(), ServiceNetwork::default());
    networks.insert(
        SHARED_NETWORK.to_string(),
        ServiceNetwork {
            aliases: vec!["dsemulator".to_string()],
        },
    );
    networks
}

fn shared_env(settings: &Settings) -> Vec<String> {
    vec![
        format!("GCLOUD_PROJECT_ID={}", settings.gcloud_project_id),
        format!("IS_LOCAL={}", settings.local),
        format!("DATASTORE_EMULATOR_HOST={}", settings.datastore_emulator_host),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        let mut settings = Settings::new("arena-dev").with_local(true);
        settings.datastore_emulator_host = "dsemulator:8081".to_string();
        settings
    }

    fn game() -> Game {
        Game {
            id: 7,
            game_type_id: 4,
            project_ids: vec![12, 13],
        }
    }

    fn project(id: i64, directory: Option<&str>) -> Project {
        Project {
            id,
            language: "go".to_string(),
            directory: directory.map(str::to_string),
        }
    }

    #[test]
    fn test_game_project() {
        let project = game_project(
            &settings(),
            &game(),
            &[project(12, None), project(13, Some("/home/dev/bot"))],
        );

        assert_eq!(project.name, "game-7");
        assert_eq!(project.services.len(), 3);

        let runner = project.service("game-runner").unwrap();
        assert_eq!(runner.image, "gcr.io/arena-dev/game-runner-4:latest");
        assert_eq!(runner.ports, vec!["9000".to_string()]);
        assert_eq!(runner.env("GAME_ID"), Some("7"));
        assert_eq!(runner.env("POD_IP"), Some("game-runner"));
        assert_eq!(runner.env("IS_LOCAL"), Some("true"));
        assert_eq!(runner.env("DATASTORE_EMULATOR_HOST"), Some("dsemulator:8081"));

        let team = project.service("team-runner-12").unwrap();
        assert_eq!(team.image, "gcr.io/arena-dev/team-runner-4-go:latest");
        assert_eq!(team.env("PROJECT_ID"), Some("12"));
        assert_eq!(team.env("POD_IP"), Some("team-runner-12"));
        assert_eq!(team.volumes.len(), 1);

        let local = project.service("team-runner-13").unwrap();
        assert_eq!(local.volumes[1], "/home/dev/bot:/source");
    }

    #[test]
    fn test_builder_project() {
        let project = builder_project(&settings(), &GameType { id: 2 });

        assert_eq!(project.name, "game-type-builder-2");
        let builder = project.service("game-type-builder").unwrap();
        assert!(builder.privileged);
        assert_eq!(builder.env("GAME_TYPE_ID"), Some("2"));
        assert!(
            builder
                .volumes
                .contains(&"/var/run/docker.sock:/var/run/docker.sock".to_string())
        );
    }

    #[test]
    fn test_serializes_external_resources() {
        let json = serde_json::to_value(builder_project(&settings(), &GameType { id: 2 })).unwrap();

        assert_eq!(json["name"], "game-type-builder-2");
        assert_eq!(json["networks"]["cgp"]["external"], true);
        assert_eq!(json["networks"]["cgp"]["name"], "arena_cgp-network");
        assert_eq!(json["volumes"]["localstore"]["name"], "arena_local-store");
        assert_eq!(json["services"]["game-type-builder"]["privileged"], true);
    }

    #[test]
    fn test_unprivileged_flag_is_omitted() {
        let json = serde_json::to_value(game_project(&settings(), &game(), &[])).unwrap();
        assert!(json["services"]["game-runner"].get("privileged").is_none());
    }

    #[test]
    fn test_env_lookup_requires_exact_key() {
        let service = Service {
            environment: vec!["GAME_ID_EXTRA=1".to_string(), "GAME_ID=7".to_string()],
            ..Default::default()
        };
        assert_eq!(service.env("GAME_ID"), Some("7"));
        assert_eq!(service.env("GAME"), None);
    }
}
