//! Launch command handlers
//!
//! Turns parsed arguments into a job request, submits it and hands the
//! resulting job to the follower.

use anyhow::{Context, Result};
use arena_core::domain::game::{Game, GameType, Project};
use arena_core::domain::request::{JobRequest, RequestKind};
use arena_jobs::{JobError, connect};
use colored::*;

use crate::commands::Commands;
use crate::commands::follow::{self, WaitArgs, WaitFor};
use crate::config::Config;

/// Converts a command into the request it submits and how to wait for it
pub fn into_request(command: Commands) -> (JobRequest, WaitArgs) {
    match command {
        Commands::Game {
            id,
            game_type,
            projects,
            wait,
        } => {
            let game = Game {
                id,
                game_type_id: game_type,
                project_ids: projects.iter().map(|p| p.id).collect(),
            };
            (JobRequest::StartGame { game, projects }, wait)
        }
        Commands::Bot {
            ip,
            bot_id,
            game_id,
            game_type,
            project,
            wait,
        } => {
            let game = Game {
                id: game_id,
                game_type_id: game_type,
                project_ids: vec![project.id],
            };
            (
                JobRequest::StartBot {
                    ip,
                    bot_id,
                    project,
                    game,
                },
                wait,
            )
        }
        Commands::Build { game_type, wait } => (
            JobRequest::BuildGameType {
                game_type: GameType { id: game_type },
            },
            wait,
        ),
    }
}

/// Submits the request and follows the job as asked
pub async fn launch(request: JobRequest, wait: WaitArgs, config: &Config) -> Result<()> {
    let client = connect(&config.settings)
        .await
        .context("Failed to connect to backend")?;

    println!(
        "{} {} on {} backend",
        "▸".cyan(),
        format!("{}", request.kind()).bold(),
        client.backend()
    );

    let job = match client.submit(&request).await {
        Ok(job) => job,
        Err(err @ JobError::UnsupportedOperation { .. }) => {
            println!("{} {}", "✗".red(), err.to_string().red());
            return Err(err.into());
        }
        Err(err) => return Err(err).context("Failed to submit job"),
    };

    println!("  Workload: {}", job.name().green());

    let wait_for = wait.wait.unwrap_or_else(|| default_wait(request.kind()));
    follow::follow(job.as_ref(), wait_for, wait.timeout()).await
}

/// Builds wait until they finish; games and bots until they are up
fn default_wait(kind: RequestKind) -> WaitFor {
    match kind {
        RequestKind::BuildGameType => WaitFor::Completion,
        RequestKind::StartGame | RequestKind::StartBot => WaitFor::Startup,
    }
}

/// Parses ID:LANGUAGE[:DIRECTORY]
pub fn parse_project(s: &str) -> std::result::Result<Project, String> {
    let mut parts = s.splitn(3, ':');

    let id = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| "missing project ID".to_string())?
        .parse::<i64>()
        .map_err(|e| format!("invalid project ID: {}", e))?;

    let language = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| "missing project language".to_string())?
        .to_string();

    let directory = parts.next().filter(|p| !p.is_empty()).map(str::to_string);

    Ok(Project {
        id,
        language,
        directory,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_project() {
        let project = parse_project("12:py").unwrap();
        assert_eq!(project.id, 12);
        assert_eq!(project.language, "py");
        assert!(project.directory.is_none());

        let project = parse_project("13:go:/home/dev/bot").unwrap();
        assert_eq!(project.directory.as_deref(), Some("/home/dev/bot"));
    }

    #[test]
    fn test_parse_project_invalid() {
        assert!(parse_project("").is_err());
        assert!(parse_project("abc:py").is_err());
        assert!(parse_project("12").is_err());
        assert!(parse_project("12:").is_err());
    }

    #[test]
    fn test_default_wait() {
        assert_eq!(default_wait(RequestKind::StartGame), WaitFor::Startup);
        assert_eq!(default_wait(RequestKind::StartBot), WaitFor::Startup);
        assert_eq!(default_wait(RequestKind::BuildGameType), WaitFor::Completion);
    }

    #[test]
    fn test_game_command_collects_project_ids() {
        let command = Commands::Game {
            id: 7,
            game_type: 4,
            projects: vec![parse_project("12:py").unwrap(), parse_project("13:go").unwrap()],
            wait: WaitArgs::default(),
        };

        let (request, _) = into_request(command);
        match request {
            JobRequest::StartGame { game, projects } => {
                assert_eq!(game.id, 7);
                assert_eq!(game.game_type_id, 4);
                assert_eq!(game.project_ids, vec![12, 13]);
                assert_eq!(projects.len(), 2);
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }

    #[test]
    fn test_build_command() {
        let (request, _) = into_request(Commands::Build {
            game_type: 2,
            wait: WaitArgs::default(),
        });
        assert_eq!(request.workload_name(), "builder-2");
    }
}
