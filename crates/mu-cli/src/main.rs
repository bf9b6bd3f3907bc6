//! Melody Unmix command-line client
//!
//! Usage:
//!   melody-unmix login <email> [--remember]   - Sign in
//!   melody-unmix upload <file> [--wait]       - Upload a track for separation
//!   melody-unmix status <id> [--watch]        - Show (or follow) a job
//!   melody-unmix download <id> [stem]         - Fetch separated stems
//!   melody-unmix --help                       - Everything else

mod account;
mod app;
mod jobs;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mu_core::{Stem, Theme, UnmixError};

use crate::app::App;

#[derive(Parser, Debug)]
#[command(name = "melody-unmix", version, about = "Melody Unmix stem separation client")]
struct Cli {
    /// Config file (takes precedence over MELODY_UNMIX_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend origin, e.g. https://unmix.example.com
    #[arg(long, global = true)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in with email and password
    Login {
        email: String,
        /// Prompted for when omitted
        #[arg(long)]
        password: Option<String>,
        /// Keep the session across restarts
        #[arg(short, long)]
        remember: bool,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami {
        /// Fetch the profile from the server instead of the cache
        #[arg(long)]
        refresh: bool,
    },
    /// Create an account
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Prompted for (twice) when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Show or change the profile
    Profile {
        /// New display name
        #[arg(long)]
        name: Option<String>,
        /// system, light or dark
        #[arg(long)]
        theme: Option<Theme>,
        /// Image file to use as avatar
        #[arg(long)]
        avatar: Option<PathBuf>,
    },
    /// Upload a WAV or MP3 file for separation
    Upload {
        file: PathBuf,
        /// Follow the job until it finishes
        #[arg(short, long)]
        wait: bool,
    },
    /// Show a job's status
    Status {
        id: String,
        /// Keep polling until the job finishes
        #[arg(short, long)]
        watch: bool,
    },
    /// List uploaded tracks
    List,
    /// Download one stem, or every stem as a zip
    Download {
        id: String,
        /// vocals, drums, guitar, bass, other or all
        #[arg(default_value = "all")]
        stem: Stem,
        /// Target directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Delete a track and its stems
    Delete { id: String },
    /// Reset a forgotten password
    ResetPassword {
        #[command(subcommand)]
        action: ResetAction,
    },
    /// Verify the account's email address
    VerifyEmail {
        #[command(subcommand)]
        action: VerifyAction,
    },
    /// Permanently delete the account
    DeleteAccount {
        /// Must read "eliminar cuenta"
        #[arg(long)]
        phrase: String,
    },
}

#[derive(Subcommand, Debug)]
enum ResetAction {
    /// Email a reset code
    Request { email: String },
    /// Check the emailed code
    Verify { email: String, code: String },
    /// Set the new password
    Confirm {
        /// Defaults to the grant saved by `verify`
        #[arg(long, requires = "token")]
        uid: Option<String>,
        #[arg(long, requires = "uid")]
        token: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum VerifyAction {
    /// Email a verification code
    Send { email: String },
    /// Submit the emailed code
    Verify { email: String, code: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let app = App::open(cli.config.as_deref(), cli.api_base)?;

    match cli.command {
        Commands::Login {
            email,
            password,
            remember,
        } => account::login(&app, &email, password, remember).await,
        Commands::Logout => account::logout(&app).await,
        Commands::Whoami { refresh } => account::whoami(&app, refresh).await,
        Commands::Register {
            first_name,
            last_name,
            username,
            email,
            password,
        } => account::register(&app, &first_name, &last_name, &username, &email, password).await,
        Commands::Profile {
            name,
            theme,
            avatar,
        } => account::profile(&app, name, theme, avatar).await,
        Commands::Upload { file, wait } => jobs::upload(&app, &file, wait).await,
        Commands::Status { id, watch } => jobs::status(&app, &id, watch).await,
        Commands::List => jobs::list(&app).await,
        Commands::Download { id, stem, out } => jobs::download(&app, &id, stem, &out).await,
        Commands::Delete { id } => jobs::delete(&app, &id).await,
        Commands::ResetPassword { action } => match action {
            ResetAction::Request { email } => account::reset_request(&app, &email).await,
            ResetAction::Verify { email, code } => account::reset_verify(&app, &email, &code).await,
            ResetAction::Confirm { uid, token } => account::reset_confirm(&app, uid, token).await,
        },
        Commands::VerifyEmail { action } => match action {
            VerifyAction::Send { email } => account::verify_send(&app, &email).await,
            VerifyAction::Verify { email, code } => account::verify_code(&app, &email, &code).await,
        },
        Commands::DeleteAccount { phrase } => account::delete_account(&app, &phrase).await,
    }
}

fn report(err: &anyhow::Error) {
    eprintln!("Error: {err:#}");
    if let Some(UnmixError::Rejected { field_errors, .. }) = err.downcast_ref::<UnmixError>() {
        for (field, message) in field_errors {
            eprintln!("  {field}: {message}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_download_defaults_to_archive() {
        let cli = Cli::try_parse_from(["melody-unmix", "download", "12"]).unwrap();
        match cli.command {
            Commands::Download { id, stem, out } => {
                assert_eq!(id, "12");
                assert_eq!(stem, Stem::All);
                assert_eq!(out, PathBuf::from("."));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_stem_and_theme() {
        assert!(Cli::try_parse_from(["melody-unmix", "download", "1", "piano"]).is_err());
        assert!(Cli::try_parse_from(["melody-unmix", "profile", "--theme", "sepia"]).is_err());
    }

    #[test]
    fn test_reset_confirm_needs_both_grant_parts() {
        assert!(
            Cli::try_parse_from(["melody-unmix", "reset-password", "confirm", "--uid", "MQ"])
                .is_err()
        );
        assert!(
            Cli::try_parse_from([
                "melody-unmix",
                "reset-password",
                "confirm",
                "--uid",
                "MQ",
                "--token",
                "abc"
            ])
            .is_ok()
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "melody-unmix",
            "list",
            "--api-base",
            "https://unmix.example.com",
        ])
        .unwrap();
        assert_eq!(cli.api_base.as_deref(), Some("https://unmix.example.com"));
    }
}
