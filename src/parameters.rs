use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};

use crate::identity::{ManagedIdentity, UserAssignedId};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Acquire an access token for a target resource through the host's
    /// managed identity endpoint.
    AcquireToken {
        /// Resource (or scope, which is reduced to its resource) to acquire a token for
        #[arg(long, short, required = true)]
        resource: String,

        /// User-assigned identity selector; system-assigned when none is given.
        #[command(flatten)]
        identity_args: IdentityArgs,

        /// Select format how the token should be printed
        #[arg(long, required = true)]
        output_token_format: OutputTokenFormat,
    },
}

#[derive(Args, Debug)]
#[group(id = "user-assigned-id", required = false, multiple = false)]
pub struct IdentityArgs {
    /// Client id of a user-assigned identity
    #[arg(long, group = "user-assigned-id")]
    client_id: Option<String>,

    /// Object id of a user-assigned identity
    #[arg(long, group = "user-assigned-id")]
    object_id: Option<String>,

    /// Azure resource id of a user-assigned identity
    #[arg(long, group = "user-assigned-id")]
    mi_res_id: Option<String>,
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputTokenFormat {
    /// Returns only the access token without type or expiration
    #[value(name = "Plain")]
    Plain,
    /// Returns full token information in json format
    #[value(name = "Json")]
    Json,
}

pub fn select_identity(args: &IdentityArgs) -> ManagedIdentity {
    if let Some(client_id) = &args.client_id {
        return ManagedIdentity::UserAssigned(UserAssignedId::ClientId(client_id.clone()));
    }
    if let Some(object_id) = &args.object_id {
        return ManagedIdentity::UserAssigned(UserAssignedId::ObjectId(object_id.clone()));
    }
    if let Some(resource_id) = &args.mi_res_id {
        return ManagedIdentity::UserAssigned(UserAssignedId::ResourceId(resource_id.clone()));
    }
    ManagedIdentity::SystemAssigned
}
