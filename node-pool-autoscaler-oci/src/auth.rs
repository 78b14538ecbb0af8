//! Request signing for OCI API calls.

use anyhow::{anyhow, Context, Error};
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::{
    header::{HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, DATE, HOST},
    Method, Request,
};
use rsa::{
    pkcs1::DecodeRsaPrivateKey,
    pkcs1v15::SigningKey,
    pkcs8::DecodePrivateKey,
    signature::{SignatureEncoding, Signer},
    RsaPrivateKey,
};
use sha2::{Digest, Sha256};

use crate::config::OciSettings;

/// How the provider authenticates against OCI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    WorkloadIdentity,
    InstancePrincipal,
    ApiKey,
}

impl AuthStrategy {
    pub fn from_settings(settings: &OciSettings) -> Self {
        if settings.use_workload_identity {
            AuthStrategy::WorkloadIdentity
        } else if settings.use_instance_principal || settings.oke_use_instance_principal {
            AuthStrategy::InstancePrincipal
        } else {
            AuthStrategy::ApiKey
        }
    }
}

/// Adds authentication to an outgoing request.
pub trait RequestSigner: Send + Sync {
    fn sign(&self, request: &mut Request) -> Result<(), Error>;
}

const X_CONTENT_SHA256: &str = "x-content-sha256";

/// Signs requests with a user API key, following the OCI HTTP signature scheme.
pub struct ApiKeySigner {
    key_id: String,
    signing_key: SigningKey<Sha256>,
}

impl ApiKeySigner {
    pub fn new(tenancy: &str, user: &str, fingerprint: &str, pem: &str) -> Result<Self, Error> {
        let key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .context("failed to decode API private key")?;

        Ok(ApiKeySigner {
            key_id: format!("{tenancy}/{user}/{fingerprint}"),
            signing_key: SigningKey::<Sha256>::new(key),
        })
    }

    pub fn from_settings(settings: &OciSettings) -> Result<Self, Error> {
        let required = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| anyhow!("{name} must be set for API key authentication"))
        };

        let tenancy = required(&settings.tenancy_ocid, "OCI_TENANCY_OCID")?;
        let user = required(&settings.user_ocid, "OCI_USER_OCID")?;
        let fingerprint = required(&settings.key_fingerprint, "OCI_KEY_FINGERPRINT")?;
        let key_path = required(&settings.private_key_path, "OCI_PRIVATE_KEY_PATH")?;

        let pem = std::fs::read_to_string(&key_path)
            .with_context(|| format!("failed to read private key {key_path}"))?;

        Self::new(&tenancy, &user, &fingerprint, &pem)
    }
}

impl RequestSigner for ApiKeySigner {
    fn sign(&self, request: &mut Request) -> Result<(), Error> {
        let url = request.url();
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("request url has no host: {url}"))?
            .to_string();
        let target = match url.query() {
            Some(query) => format!("{} {}?{}", request.method().as_str().to_lowercase(), url.path(), query),
            None => format!("{} {}", request.method().as_str().to_lowercase(), url.path()),
        };
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();

        let mut headers = vec![
            ("date", date.clone()),
            ("(request-target)", target),
            ("host", host.clone()),
        ];

        let with_body = matches!(*request.method(), Method::POST | Method::PUT | Method::PATCH);
        if with_body {
            let (digest, length) = {
                let body = request
                    .body()
                    .and_then(|b| b.as_bytes())
                    .unwrap_or_default();
                (STANDARD.encode(Sha256::digest(body)), body.len().to_string())
            };

            request
                .headers_mut()
                .insert(X_CONTENT_SHA256, HeaderValue::from_str(&digest)?);
            request
                .headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from_str(&length)?);
            request
                .headers_mut()
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
            let content_type = request
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("application/json")
                .to_string();

            headers.push((X_CONTENT_SHA256, digest));
            headers.push(("content-type", content_type));
            headers.push(("content-length", length));
        }

        let signature = self
            .signing_key
            .sign(signing_string(&headers).as_bytes())
            .to_bytes();

        let authorization = authorization_header(&self.key_id, &headers, &STANDARD.encode(signature));

        let request_headers = request.headers_mut();
        request_headers.insert(DATE, HeaderValue::from_str(&date)?);
        request_headers.insert(HOST, HeaderValue::from_str(&host)?);
        request_headers.insert(AUTHORIZATION, HeaderValue::from_str(&authorization)?);
        Ok(())
    }
}

fn signing_string(headers: &[(&str, String)]) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{name}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn authorization_header(key_id: &str, headers: &[(&str, String)], signature: &str) -> String {
    let names = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(" ");
    format!(
        r#"Signature version="1",headers="{names}",keyId="{key_id}",algorithm="rsa-sha256",signature="{signature}""#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> OciSettings {
        OciSettings {
            region: "us-phoenix-1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn workload_identity_takes_precedence() {
        let settings = OciSettings {
            use_workload_identity: true,
            use_instance_principal: true,
            ..settings()
        };
        assert_eq!(
            AuthStrategy::from_settings(&settings),
            AuthStrategy::WorkloadIdentity
        );
    }

    #[test]
    fn either_instance_principal_flag_selects_it() {
        let settings = OciSettings {
            oke_use_instance_principal: true,
            ..settings()
        };
        assert_eq!(
            AuthStrategy::from_settings(&settings),
            AuthStrategy::InstancePrincipal
        );
        assert_eq!(AuthStrategy::from_settings(&self::settings()), AuthStrategy::ApiKey);
    }

    #[test]
    fn signing_string_keeps_header_order() {
        let headers = vec![
            ("date", "Thu, 05 Jan 2014 21:31:40 GMT".to_string()),
            ("(request-target)", "get /20180222/nodePools/np".to_string()),
            ("host", "containerengine.us-phoenix-1.oci.oraclecloud.com".to_string()),
        ];

        assert_eq!(
            signing_string(&headers),
            "date: Thu, 05 Jan 2014 21:31:40 GMT\n\
             (request-target): get /20180222/nodePools/np\n\
             host: containerengine.us-phoenix-1.oci.oraclecloud.com"
        );
        assert_eq!(
            authorization_header("t/u/f", &headers, "c2ln"),
            r#"Signature version="1",headers="date (request-target) host",keyId="t/u/f",algorithm="rsa-sha256",signature="c2ln""#
        );
    }

    #[test]
    fn missing_api_key_settings_are_reported() {
        let err = ApiKeySigner::from_settings(&settings()).err().unwrap();
        assert!(err.to_string().contains("OCI_TENANCY_OCID"));
    }

    #[test]
    fn rejects_garbage_key() {
        assert!(ApiKeySigner::new("t", "u", "f", "not a key").is_err());
    }
}
