use std::env;
use std::env::VarError;

/// Fixed metadata address on Azure VMs. Not configurable.
pub(crate) const AZURE_VM_TOKEN_ENDPOINT: &str =
    "http://169.254.169.254/metadata/identity/oauth2/token";

const IDENTITY_ENDPOINT_ENV_NAME: &str = "IDENTITY_ENDPOINT";
const IDENTITY_HEADER_ENV_NAME: &str = "IDENTITY_HEADER";

/// Which platform identity endpoint serves this process.
///
/// App-Service-style hosts (App Service, Functions, Automation) inject an
/// endpoint URL and a request-authentication header value through the
/// environment; everything else falls back to the VM metadata service.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentitySource {
    AzureVm,
    AppService {
        endpoint: String,
        identity_header: String,
    },
}

impl IdentitySource {
    /// Selects the identity source from the process environment.
    ///
    /// Called fresh on every acquisition: the signals are assumed stable for
    /// the process lifetime, but the check is cheap.
    pub fn detect() -> Self {
        Self::from_env(env::var)
    }

    fn from_env<F>(env_var: F) -> Self
    where
        F: Fn(&'static str) -> Result<String, VarError>,
    {
        match (
            env_var(IDENTITY_ENDPOINT_ENV_NAME),
            env_var(IDENTITY_HEADER_ENV_NAME),
        ) {
            (Ok(endpoint), Ok(identity_header)) => IdentitySource::AppService {
                endpoint,
                identity_header,
            },
            _ => IdentitySource::AzureVm,
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::env::VarError;

    use super::{IDENTITY_ENDPOINT_ENV_NAME, IDENTITY_HEADER_ENV_NAME, IdentitySource};

    fn detect_with(env_values: HashMap<&'static str, &'static str>) -> IdentitySource {
        IdentitySource::from_env(|k| {
            env_values
                .get(k)
                .map(|v| v.to_string())
                .ok_or(VarError::NotPresent)
        })
    }

    #[test]
    fn both_signals_present_select_app_service() {
        let source = detect_with(HashMap::from([
            (IDENTITY_ENDPOINT_ENV_NAME, "http://127.0.0.1:8081/msi/token"),
            (IDENTITY_HEADER_ENV_NAME, "header-value"),
        ]));
        assert_eq!(
            source,
            IdentitySource::AppService {
                endpoint: "http://127.0.0.1:8081/msi/token".to_string(),
                identity_header: "header-value".to_string(),
            }
        );
    }

    #[test]
    fn no_signals_select_azure_vm() {
        let source = detect_with(HashMap::from([("SOME_OTHER", "env-variable")]));
        assert_eq!(source, IdentitySource::AzureVm);
    }

    #[test]
    fn one_signal_alone_selects_azure_vm() {
        let endpoint_only = detect_with(HashMap::from([(
            IDENTITY_ENDPOINT_ENV_NAME,
            "http://127.0.0.1:8081/msi/token",
        )]));
        assert_eq!(endpoint_only, IdentitySource::AzureVm);

        let header_only = detect_with(HashMap::from([(IDENTITY_HEADER_ENV_NAME, "header-value")]));
        assert_eq!(header_only, IdentitySource::AzureVm);
    }
}
