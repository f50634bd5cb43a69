use clap::Parser;
use mi_auth::TokenAcquirer;
use mi_auth::client::ManagedIdentityClient;
use mi_auth::http::client::HttpClient;
use mi_auth::parameters::{Commands, OutputTokenFormat, select_identity};
use mi_auth::resource::scope_to_resource;
use mi_auth::token::TokenResponse;
use std::error::Error;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "mi-auth-cli")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli_command = Cli::parse();

    let http_client =
        HttpClient::new().map_err(|e| format!("error creating http client: {}", e))?;

    match cli_command.command {
        Commands::AcquireToken {
            resource,
            identity_args,
            output_token_format,
        } => {
            let identity = select_identity(&identity_args);
            let resource = scope_to_resource(&resource);
            let client = ManagedIdentityClient::new(identity, http_client);

            match client.acquire_token(&resource)? {
                TokenResponse::Token(record) => {
                    match output_token_format {
                        OutputTokenFormat::Plain => println!("{}", record.access_token),
                        OutputTokenFormat::Json => {
                            println!("{}", serde_json::to_string_pretty(&record)?)
                        }
                    }
                    Ok(ExitCode::SUCCESS)
                }
                TokenResponse::Error(error) => {
                    eprintln!("{error}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}
