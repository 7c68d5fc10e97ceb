//! Pod descriptors
//!
//! Turns a job request into a `v1/Pod`. The pod is named after the request's
//! workload name, so other services can find it again.

use arena_core::domain::game::{Game, GameType, Project};
use arena_core::domain::request::JobRequest;
use k8s_openapi::api::core::v1::{
    ConfigMapKeySelector, Container, ContainerPort, EnvVar, EnvVarSource, HostPathVolumeSource,
    ObjectFieldSelector, Pod, PodSpec, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::config::Settings;

const CONTAINER_PORT: i32 = 9000;

const SOURCE_VOLUME: &str = "source-vol";
const BOT_SOURCE_VOLUME: &str = "bot-source-vol";
const LOCAL_STORE_VOLUME: &str = "local-store-vol";
const DOCKER_SOCK_VOLUME: &str = "dockersock";
const DOCKER_SOCK_PATH: &str = "/var/run/docker.sock";

/// Builds the pod for any request kind
pub fn build_pod(settings: &Settings, request: &JobRequest) -> Pod {
    let name = request.workload_name();
    let (volumes, container) = match request {
        JobRequest::StartGame { game, .. } => game_container(settings, &name, game),
        JobRequest::StartBot {
            ip,
            bot_id,
            project,
            game,
        } => bot_container(settings, ip, *bot_id, project, game),
        JobRequest::BuildGameType { game_type } => builder_container(settings, game_type),
    };

    Pod {
        metadata: ObjectMeta {
            name: Some(name),
            ..Default::default()
        },
        spec: Some(PodSpec {
            volumes: Some(volumes),
            containers: vec![container],
            restart_policy: Some("Never".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

/// Game runner; the source tree is mounted read-only
fn game_container(settings: &Settings, name: &str, game: &Game) -> (Vec<Volume>, Container) {
    let mut volumes = vec![host_path_volume(SOURCE_VOLUME, &settings.source_path)];
    let mut mounts = vec![mount(SOURCE_VOLUME, &settings.source_path, true)];
    add_local_store(settings, &mut volumes, &mut mounts);

    let mut env = config_env(settings);
    env.push(env_var("GAME_ID", game.id.to_string()));
    env.push(pod_ip_env_var());

    let container = Container {
        name: name.to_string(),
        image: Some(settings.image(&format!("game-runner-{}", game.game_type_id))),
        ports: Some(container_ports()),
        env: Some(env),
        volume_mounts: Some(mounts),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    };

    (volumes, container)
}

/// Bot runner; only the bot's own project directory is mounted
fn bot_container(
    settings: &Settings,
    ip: &str,
    bot_id: i32,
    project: &Project,
    game: &Game,
) -> (Vec<Volume>, Container) {
    let project_source = format!(
        "{}/{}",
        settings.source_path.trim_end_matches('/'),
        project.id
    );
    let mut volumes = vec![host_path_volume(BOT_SOURCE_VOLUME, &project_source)];
    let mut mounts = vec![mount(BOT_SOURCE_VOLUME, &settings.source_path, false)];
    add_local_store(settings, &mut volumes, &mut mounts);

    let mut env = vec![
        env_var("GAME_RUNNER_IP", ip),
        env_var("BOT_ID", bot_id.to_string()),
        env_var("PROJECT_ID", project.id.to_string()),
        pod_ip_env_var(),
    ];
    env.extend(config_env(settings));

    let container = Container {
        name: format!("bot-{}", bot_id),
        image: Some(settings.image(&format!(
            "botrunner-{}-{}",
            game.game_type_id, project.language
        ))),
        ports: Some(container_ports()),
        env: Some(env),
        volume_mounts: Some(mounts),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    };

    (volumes, container)
}

/// Game type builder
///
/// The builder drives the node's docker daemon, so it gets the host socket
/// and runs privileged.
fn builder_container(settings: &Settings, game_type: &GameType) -> (Vec<Volume>, Container) {
    let mut volumes = vec![host_path_volume(DOCKER_SOCK_VOLUME, DOCKER_SOCK_PATH)];
    let mut mounts = vec![mount(DOCKER_SOCK_VOLUME, DOCKER_SOCK_PATH, false)];
    add_local_store(settings, &mut volumes, &mut mounts);

    let mut env = config_env(settings);
    env.push(env_var("GAME_TYPE_ID", game_type.id.to_string()));

    let container = Container {
        name: "builder".to_string(),
        image: Some(settings.image("builder")),
        env: Some(env),
        volume_mounts: Some(mounts),
        security_context: Some(SecurityContext {
            privileged: Some(true),
            ..Default::default()
        }),
        image_pull_policy: Some("IfNotPresent".to_string()),
        ..Default::default()
    };

    (volumes, container)
}

fn add_local_store(settings: &Settings, volumes: &mut Vec<Volume>, mounts: &mut Vec<VolumeMount>) {
    if settings.local {
        volumes.push(host_path_volume(LOCAL_STORE_VOLUME, &settings.local_store_path));
        mounts.push(mount(LOCAL_STORE_VOLUME, &settings.local_store_path, false));
    }
}

fn host_path_volume(name: &str, path: &str) -> Volume {
    Volume {
        name: name.to_string(),
        host_path: Some(HostPathVolumeSource {
            path: path.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: Some(read_only),
        ..Default::default()
    }
}

fn container_ports() -> Vec<ContainerPort> {
    vec![ContainerPort {
        container_port: CONTAINER_PORT,
        ..Default::default()
    }]
}

/// Shared settings, read from the config map at container start
fn config_env(settings: &Settings) -> Vec<EnvVar> {
    vec![
        config_env_var(settings, "GCLOUD_PROJECT_ID", "gcloud-project-id"),
        config_env_var(settings, "IS_LOCAL", "is-local"),
        config_env_var(settings, "DATASTORE_EMULATOR_HOST", "datastore-emulator-host"),
    ]
}

fn config_env_var(settings: &Settings, name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            config_map_key_ref: Some(ConfigMapKeySelector {
                name: settings.config_map_name.clone(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_ip_env_var() -> EnvVar {
    EnvVar {
        name: "POD_IP".to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: "status.podIP".to_string(),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}
