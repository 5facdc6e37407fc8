// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::borrow::Cow;
use std::str::FromStr;

use ethereum_types::Secret;
use serde::Deserialize;

/// A secp256k1 secret key used by the local signer.
///
/// Accepted forms: a `0x` prefixed 64 chars hex string, or `$VAR` naming an
/// environment variable holding one. The key is never printed.
#[derive(Clone)]
pub struct PrivateKey(Secret);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PrivateKey").finish()
    }
}

impl From<Secret> for PrivateKey {
    fn from(secret: Secret) -> Self {
        PrivateKey(secret)
    }
}

impl std::ops::Deref for PrivateKey {
    type Target = Secret;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Expands `$VAR` to the value of the environment variable `VAR`.
pub(crate) fn resolve_env<E>(value: &str) -> Result<Cow<'_, str>, E>
where
    E: serde::de::Error,
{
    match value.strip_prefix('$') {
        Some(var) => {
            tracing::trace!("Reading {} from env", var);
            std::env::var(var).map(Cow::Owned).map_err(|e| {
                serde::de::Error::custom(format!(
                    "error while loading this env {var}: {e}",
                ))
            })
        }
        None => Ok(Cow::Borrowed(value)),
    }
}

impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVistor {
            type Value = Secret;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let value = resolve_env::<E>(value)?;
                if !value.starts_with("0x") {
                    return Err(serde::de::Error::custom(
                        "expected a 0x prefixed hex string",
                    ));
                }
                Secret::from_str(&value).map_err(|e| {
                    serde::de::Error::custom(format!(
                        "{e}\n expected a 66 chars string (including the 0x prefix) but found {} chars",
                        value.len()
                    ))
                })
            }
        }

        let secret = deserializer.deserialize_str(PrivateKeyVistor)?;
        Ok(Self(secret))
    }
}
