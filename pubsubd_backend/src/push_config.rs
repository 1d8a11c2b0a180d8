//! Normalization of client supplied push configurations.

use reqwest::Url;

use crate::{
    auth::gen_token,
    error::ApiError,
    model::{
        AuthorizationHeader, AuthorizationType, PushConfig, PushConfigRequest, PushType,
        RetryPolicy, RetryPolicyType, DEFAULT_RETRY_PERIOD_MILLIS,
    },
};

pub const UNSUPPORTED_RETRY_POLICY: &str =
    "Retry policy can only be of 'linear' or 'slowstart' type";
pub const UNSUPPORTED_AUTHORIZATION_HEADER: &str =
    "Authorization header type can only be of 'autogen' or 'disabled' type";
pub const UNSUPPORTED_PUSH_TYPE: &str =
    "Push configuration type can only be of 'http_endpoint' or 'mattermost'";
pub const INVALID_HTTPS_ENDPOINT: &str = "Push endpoint should be addressed by a valid https url";
pub const EMPTY_MATTERMOST_URL: &str = "Field mattermostUrl cannot be empty";

/// Whether `endpoint` is an absolute `https` url with a host.
pub fn is_valid_https(endpoint: &str) -> bool {
    match Url::parse(endpoint) {
        Ok(url) => url.scheme() == "https" && url.host_str().is_some_and(|host| !host.is_empty()),
        Err(_) => false,
    }
}

fn retry_policy(req: &PushConfigRequest) -> Result<RetryPolicy, ApiError> {
    let policy_type = if req.retry_policy.policy_type.is_empty() {
        RetryPolicyType::Linear
    } else {
        RetryPolicyType::parse(&req.retry_policy.policy_type)
            .ok_or_else(|| ApiError::InvalidArgument(UNSUPPORTED_RETRY_POLICY.to_string()))?
    };

    let period = if req.retry_policy.period <= 0 {
        DEFAULT_RETRY_PERIOD_MILLIS
    } else {
        req.retry_policy.period as u64
    };

    Ok(RetryPolicy {
        policy_type,
        period,
    })
}

/// Resolves the authorization header of an http endpoint configuration.
///
/// An explicitly requested type wins. Otherwise a first activation gets an
/// autogenerated header and an existing header keeps its type and value.
fn authorization_header(
    requested: &str,
    existing: Option<&PushConfig>,
) -> Result<AuthorizationHeader, ApiError> {
    let requested = if requested.is_empty() {
        None
    } else {
        Some(AuthorizationType::parse(requested).ok_or_else(|| {
            ApiError::InvalidArgument(UNSUPPORTED_AUTHORIZATION_HEADER.to_string())
        })?)
    };

    let header = match (requested, existing) {
        (Some(AuthorizationType::Autogen), _) | (None, None) => AuthorizationHeader {
            auth_type: AuthorizationType::Autogen,
            value: gen_token(),
        },
        (Some(AuthorizationType::Disabled), _) => AuthorizationHeader {
            auth_type: AuthorizationType::Disabled,
            value: String::new(),
        },
        (None, Some(existing)) => match existing.authorization_header.auth_type {
            AuthorizationType::Autogen if !existing.authorization_header.value.is_empty() => {
                existing.authorization_header.clone()
            }
            AuthorizationType::Autogen => AuthorizationHeader {
                auth_type: AuthorizationType::Autogen,
                value: gen_token(),
            },
            AuthorizationType::Disabled => AuthorizationHeader {
                auth_type: AuthorizationType::Disabled,
                value: String::new(),
            },
        },
    };

    Ok(header)
}

/// Validates `req` against the subscription's current push configuration
/// (`None` for a pull subscription) and returns the configuration to persist.
pub fn normalize(
    req: &PushConfigRequest,
    existing: Option<&PushConfig>,
) -> Result<PushConfig, ApiError> {
    let retry_policy = retry_policy(req)?;

    let push_type = PushType::parse(&req.push_type)
        .ok_or_else(|| ApiError::InvalidArgument(UNSUPPORTED_PUSH_TYPE.to_string()))?;

    match push_type {
        PushType::HttpEndpoint => {
            if !is_valid_https(&req.endpoint) {
                return Err(ApiError::InvalidArgument(INVALID_HTTPS_ENDPOINT.to_string()));
            }

            let previous_endpoint = existing
                .filter(|cfg| cfg.push_type == PushType::HttpEndpoint)
                .map(|cfg| cfg.endpoint.as_str());

            let (verification_hash, verified) = match existing {
                Some(cfg) if previous_endpoint == Some(req.endpoint.as_str()) => {
                    (cfg.verification_hash.clone(), cfg.verified)
                }
                _ => (gen_token(), false),
            };

            let authorization_header =
                authorization_header(&req.authorization_header.auth_type, existing)?;

            let max_messages = if req.max_messages > 0 {
                req.max_messages
            } else {
                existing
                    .map(|cfg| cfg.max_messages)
                    .filter(|max| *max > 0)
                    .unwrap_or(1)
            };

            Ok(PushConfig {
                push_type,
                endpoint: req.endpoint.clone(),
                max_messages,
                authorization_header,
                retry_policy,
                verification_hash,
                verified,
                base64_decode: req.base64_decode,
                ..Default::default()
            })
        }
        PushType::Mattermost => {
            if req.mattermost_url.is_empty() {
                return Err(ApiError::InvalidArgument(EMPTY_MATTERMOST_URL.to_string()));
            }

            Ok(PushConfig {
                push_type,
                max_messages: 1,
                authorization_header: AuthorizationHeader {
                    auth_type: AuthorizationType::Disabled,
                    value: String::new(),
                },
                retry_policy,
                verified: true,
                mattermost_url: req.mattermost_url.clone(),
                mattermost_username: req.mattermost_username.clone(),
                mattermost_channel: req.mattermost_channel.clone(),
                base64_decode: req.base64_decode,
                ..Default::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuthorizationHeaderRequest, RetryPolicyRequest};

    fn http_request(endpoint: &str) -> PushConfigRequest {
        PushConfigRequest {
            push_type: "http_endpoint".to_string(),
            endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn only_https_endpoints_are_accepted() {
        assert!(is_valid_https("https://www.example.com"));
        assert!(is_valid_https("https://www.example.com:8443/receive?x=1"));
        assert!(!is_valid_https("http://www.example.com"));
        assert!(!is_valid_https("ftp://www.example.com"));
        assert!(!is_valid_https("www.example.com"));
        assert!(!is_valid_https(""));

        let err = normalize(&http_request("http://www.example.com"), None).unwrap_err();
        assert_eq!(err, ApiError::InvalidArgument(INVALID_HTTPS_ENDPOINT.to_string()));
    }

    #[test]
    fn first_activation_defaults() {
        let cfg = normalize(&http_request("https://www.example.com"), None).unwrap();

        assert_eq!(cfg.max_messages, 1);
        assert_eq!(cfg.retry_policy.policy_type, RetryPolicyType::Linear);
        assert_eq!(cfg.retry_policy.period, DEFAULT_RETRY_PERIOD_MILLIS);
        assert!(!cfg.verified);
        assert!(!cfg.verification_hash.is_empty());
        assert_eq!(cfg.authorization_header.auth_type, AuthorizationType::Autogen);
        assert!(!cfg.authorization_header.value.is_empty());
    }

    #[test]
    fn unchanged_endpoint_keeps_verification_and_header() {
        let mut existing = normalize(&http_request("https://www.example.com"), None).unwrap();
        existing.verified = true;

        let mut req = http_request("https://www.example.com");
        req.max_messages = 5;
        let cfg = normalize(&req, Some(&existing)).unwrap();

        assert!(cfg.verified);
        assert_eq!(cfg.verification_hash, existing.verification_hash);
        assert_eq!(cfg.authorization_header, existing.authorization_header);
        assert_eq!(cfg.max_messages, 5);
    }

    #[test]
    fn changed_endpoint_requires_new_verification() {
        let mut existing = normalize(&http_request("https://www.example.com"), None).unwrap();
        existing.verified = true;

        let cfg = normalize(&http_request("https://other.example.com"), Some(&existing)).unwrap();

        assert!(!cfg.verified);
        assert_ne!(cfg.verification_hash, existing.verification_hash);
    }

    #[test]
    fn authorization_header_precedence() {
        let mut req = http_request("https://www.example.com");
        req.authorization_header = AuthorizationHeaderRequest {
            auth_type: "disabled".to_string(),
        };
        let disabled = normalize(&req, None).unwrap();
        assert_eq!(disabled.authorization_header.auth_type, AuthorizationType::Disabled);
        assert!(disabled.authorization_header.value.is_empty());

        let kept = normalize(&http_request("https://www.example.com"), Some(&disabled)).unwrap();
        assert_eq!(kept.authorization_header.auth_type, AuthorizationType::Disabled);

        req.authorization_header.auth_type = "autogen".to_string();
        let autogen = normalize(&req, Some(&disabled)).unwrap();
        assert!(!autogen.authorization_header.value.is_empty());

        let regenerated = normalize(&req, Some(&autogen)).unwrap();
        assert_ne!(
            regenerated.authorization_header.value,
            autogen.authorization_header.value
        );

        req.authorization_header.auth_type = "bearer".to_string();
        assert_eq!(
            normalize(&req, None).unwrap_err(),
            ApiError::InvalidArgument(UNSUPPORTED_AUTHORIZATION_HEADER.to_string())
        );
    }

    #[test]
    fn retry_policy_is_validated() {
        let mut req = http_request("https://www.example.com");
        req.retry_policy = RetryPolicyRequest {
            policy_type: "slowstart".to_string(),
            period: -5,
        };
        let cfg = normalize(&req, None).unwrap();
        assert_eq!(cfg.retry_policy.policy_type, RetryPolicyType::Slowstart);
        assert_eq!(cfg.retry_policy.period, DEFAULT_RETRY_PERIOD_MILLIS);

        req.retry_policy.policy_type = "exponential".to_string();
        assert_eq!(
            normalize(&req, None).unwrap_err(),
            ApiError::InvalidArgument(UNSUPPORTED_RETRY_POLICY.to_string())
        );
    }

    #[test]
    fn mattermost_needs_url_and_is_verified() {
        let mut req = PushConfigRequest {
            push_type: "mattermost".to_string(),
            ..Default::default()
        };
        assert_eq!(
            normalize(&req, None).unwrap_err(),
            ApiError::InvalidArgument(EMPTY_MATTERMOST_URL.to_string())
        );

        req.mattermost_url = "https://mattermost.example.com/hooks/abc".to_string();
        req.mattermost_channel = "alerts".to_string();
        let cfg = normalize(&req, None).unwrap();
        assert!(cfg.verified);
        assert_eq!(cfg.target(), "https://mattermost.example.com/hooks/abc");
        assert!(cfg.authorization().is_none());
    }

    #[test]
    fn base64_decode_follows_each_request() {
        let mut req = http_request("https://www.example.com");
        req.base64_decode = true;
        let decoding = normalize(&req, None).unwrap();
        assert!(decoding.base64_decode);

        let cfg = normalize(&http_request("https://www.example.com"), Some(&decoding)).unwrap();
        assert!(!cfg.base64_decode);

        let req = PushConfigRequest {
            push_type: "mattermost".to_string(),
            mattermost_url: "https://mattermost.example.com/hooks/abc".to_string(),
            base64_decode: true,
            ..Default::default()
        };
        assert!(normalize(&req, None).unwrap().base64_decode);
    }

    #[test]
    fn unknown_push_type_is_rejected() {
        let req = PushConfigRequest {
            push_type: "smtp".to_string(),
            ..Default::default()
        };

        assert_eq!(
            normalize(&req, None).unwrap_err(),
            ApiError::InvalidArgument(UNSUPPORTED_PUSH_TYPE.to_string())
        );
    }
}
