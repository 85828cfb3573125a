use std::str::FromStr;

use clap::Parser;
use secrecy::Secret;
use url::Url;

#[derive(Debug, Parser)]
pub(crate) struct LakecatConfig {
    /// The URL of the running lakecat server
    #[clap(
        short = 'H',
        long = "host",
        env = "LAKECAT_HOST_URL",
        default_value = "http://127.0.0.1:8181"
    )]
    pub(crate) host_url: Url,

    /// The bearer token the server was started with
    #[clap(long = "token", env = "LAKECAT_AUTH_TOKEN")]
    pub(crate) auth_token: Secret<String>,
}

/// A `NAME=VALUE` pair given on the command line
#[derive(Debug, Clone)]
pub(crate) struct KeyValue<K, V>(pub(crate) (K, V));

impl<K, V> FromStr for KeyValue<K, V>
where
    K: FromStr<Err: Into<anyhow::Error>>,
    V: FromStr<Err: Into<anyhow::Error>>,
{
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected NAME=VALUE, got '{s}'"))?;
        if key.is_empty() {
            anyhow::bail!("missing name in '{s}'");
        }
        Ok(Self((
            key.parse().map_err(Into::into)?,
            value.parse().map_err(Into::into)?,
        )))
    }
}
