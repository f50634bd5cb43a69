use crate::ClientID;

/// The managed identity the client acquires tokens for.
///
/// A system-assigned identity is bound to the hosting resource and needs no
/// identifier. A user-assigned identity is addressed by one of three
/// identifier kinds, each with its own wire parameter name.
#[derive(Debug, Clone, PartialEq)]
pub enum ManagedIdentity {
    SystemAssigned,
    UserAssigned(UserAssignedId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UserAssignedId {
    ClientId(ClientID),
    ObjectId(String),
    ResourceId(String),
}

impl ManagedIdentity {
    /// Query parameter name and value carried on the token request, if any.
    pub(crate) fn wire_param(&self) -> Option<(&'static str, &str)> {
        match self {
            ManagedIdentity::SystemAssigned => None,
            ManagedIdentity::UserAssigned(UserAssignedId::ClientId(id)) => Some(("client_id", id)),
            ManagedIdentity::UserAssigned(UserAssignedId::ObjectId(id)) => Some(("object_id", id)),
            ManagedIdentity::UserAssigned(UserAssignedId::ResourceId(id)) => {
                Some(("mi_res_id", id))
            }
        }
    }

    /// Identifier used in cache entry keys. A system-assigned identity has
    /// none; its entries are keyed with an absent client id.
    pub(crate) fn cache_client_id(&self) -> Option<&str> {
        match self {
            ManagedIdentity::SystemAssigned => None,
            ManagedIdentity::UserAssigned(
                UserAssignedId::ClientId(id)
                | UserAssignedId::ObjectId(id)
                | UserAssignedId::ResourceId(id),
            ) => Some(id),
        }
    }
}
