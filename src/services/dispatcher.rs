//! The ordered validation pipeline for POST requests.
//!
//! Stages run strictly in this order and the first failing one decides the
//! response:
//!
//! 1. no usable credentials → 401
//! 2. root address → 405
//! 3. unknown collection → 404
//! 4. rejected credentials → 403
//! 5. resource or child address → 400
//! 6. malformed or invalid entry body → 400 with a diagnostic
//!
//! Stages 1 to 5 only see the path and headers; the body is read and
//! checked afterwards. Stages 3 and 4 can be swapped with [`CheckOrder`]. Backend failures in
//! either are reported as such and never turned into 404 or 403.

use crate::{
    config::{CheckOrder, GatewayConfig},
    errors::GatewayError,
    models::{
        address::AddressKind,
        credentials::Credentials,
        entry::CreateIntent,
    },
    services::{
        address_resolver,
        authenticator,
        backend::{BackendError, BackendResult, CollectionRegistry, CredentialValidator},
        body_validator,
    },
};
use axum::http::HeaderMap;
use std::{future::Future, sync::Arc};
use tracing::debug;

/// Where a POST that passed every address and credential check will create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostTarget {
    pub database: String,
    pub collection: String,
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<dyn CollectionRegistry>,
    validator: Arc<dyn CredentialValidator>,
    config: GatewayConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn CollectionRegistry>,
        validator: Arc<dyn CredentialValidator>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            registry,
            validator,
            config,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Stages 1 to 5. Only the path and headers are consulted, so an
    /// unauthenticated or misaddressed request is rejected without its body
    /// ever being read.
    pub async fn authorize(
        &self,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<PostTarget, GatewayError> {
        let address = address_resolver::resolve(path);

        let credentials = authenticator::extract(headers).ok_or(GatewayError::AuthMissing)?;

        if address.kind == AddressKind::Root {
            return Err(GatewayError::MethodNotAllowed);
        }
        let Some((database, collection)) = address.collection_path() else {
            return Err(GatewayError::MethodNotAllowed);
        };

        match self.config.check_order {
            CheckOrder::ExistenceFirst => {
                self.check_collection(database, collection).await?;
                self.check_credentials(database, &credentials).await?;
            }
            CheckOrder::CredentialsFirst => {
                self.check_credentials(database, &credentials).await?;
                self.check_collection(database, collection).await?;
            }
        }

        if address.kind != AddressKind::Collection {
            return Err(GatewayError::ClientAddressing(path.to_string()));
        }

        Ok(PostTarget {
            database: database.to_string(),
            collection: collection.to_string(),
        })
    }

    /// Stage 6: validate the body for an authorized target.
    pub fn accept(&self, target: PostTarget, body: &[u8]) -> Result<CreateIntent, GatewayError> {
        let entry = body_validator::validate(body)?;
        debug!(
            "accepted entry `{}` for {}/{}",
            entry.title, target.database, target.collection
        );

        Ok(CreateIntent {
            database: target.database,
            collection: target.collection,
            entry,
        })
    }

    async fn check_collection(&self, database: &str, collection: &str) -> Result<(), GatewayError> {
        if self.bounded(self.registry.exists(database, collection)).await? {
            Ok(())
        } else {
            Err(GatewayError::NotFound {
                database: database.to_string(),
                collection: collection.to_string(),
            })
        }
    }

    async fn check_credentials(
        &self,
        database: &str,
        credentials: &Credentials,
    ) -> Result<(), GatewayError> {
        if self
            .bounded(self.validator.authenticate(database, credentials))
            .await?
        {
            Ok(())
        } else {
            Err(GatewayError::AuthInvalid(credentials.username.clone()))
        }
    }

    /// Apply the configured backend timeout, if any, to `call`.
    async fn bounded<T>(&self, call: impl Future<Output = BackendResult<T>>) -> BackendResult<T> {
        match self.config.backend_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| BackendError::Timeout(limit.as_secs()))?,
            None => call.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::authenticator::basic_header;
    use async_trait::async_trait;
    use axum::http::{HeaderValue, header};
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    const ENTRY: &[u8] = b"<entry xmlns=\"http://www.w3.org/2005/Atom\">\
        <title>Agrolait</title><content><city>Wavre</city></content></entry>";

    /// Knows `erptest/res.partner` and `admin:admin`.
    #[derive(Default)]
    struct StubBackend {
        failing: bool,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl StubBackend {
        async fn enter(&self) -> BackendResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing {
                return Err(BackendError::Unavailable("connection refused".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CollectionRegistry for StubBackend {
        async fn exists(&self, database: &str, name: &str) -> BackendResult<bool> {
            self.enter().await?;
            Ok(database == "erptest" && name == "res.partner")
        }
    }

    #[async_trait]
    impl CredentialValidator for StubBackend {
        async fn authenticate(
            &self,
            database: &str,
            credentials: &Credentials,
        ) -> BackendResult<bool> {
            self.enter().await?;
            Ok(database == "erptest" && *credentials == Credentials::new("admin", "admin"))
        }
    }

    fn dispatcher_with(backend: StubBackend, config: GatewayConfig) -> (Dispatcher, Arc<StubBackend>) {
        let backend = Arc::new(backend);
        let dispatcher = Dispatcher::new(backend.clone(), backend.clone(), config);
        (dispatcher, backend)
    }

    fn dispatcher() -> Dispatcher {
        dispatcher_with(StubBackend::default(), GatewayConfig::default()).0
    }

    fn auth(user: &str, pass: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&basic_header(user, pass)).unwrap(),
        );
        headers
    }

    async fn post(
        dispatcher: &Dispatcher,
        path: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<CreateIntent, GatewayError> {
        let target = dispatcher.authorize(path, headers).await?;
        dispatcher.accept(target, body)
    }

    async fn status(path: &str, headers: &HeaderMap, body: &[u8]) -> u16 {
        match post(&dispatcher(), path, headers, body).await {
            Ok(_) => 201,
            Err(err) => err.status().as_u16(),
        }
    }

    #[tokio::test]
    async fn missing_credentials_always_401() {
        let none = HeaderMap::new();
        for path in [
            "/",
            "/erptest",
            "/erptest/res.partner",
            "/erptest/res.partnerx",
            "/erptest/res.partner/4",
            "/erptest/res.partner/4/abc",
        ] {
            assert_eq!(status(path, &none, ENTRY).await, 401, "{}", path);
            assert_eq!(status(path, &none, b"<entry></content>").await, 401, "{}", path);
        }
    }

    #[tokio::test]
    async fn undecodable_credentials_count_as_missing() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic %%%"));
        assert_eq!(status("/erptest/res.partner", &headers, ENTRY).await, 401);
    }

    #[tokio::test]
    async fn root_is_405_whatever_the_credentials() {
        let (dispatcher, backend) =
            dispatcher_with(StubBackend::default(), GatewayConfig::default());
        for headers in [auth("admin", "admin"), auth("bla", "blub")] {
            for path in ["/", "/erptest"] {
                let err = post(&dispatcher, path, &headers, ENTRY).await.unwrap_err();
                assert!(matches!(err, GatewayError::MethodNotAllowed), "{}", path);
            }
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn wrong_credentials_on_known_collection_403() {
        let bad = auth("bla", "blub");
        for path in [
            "/erptest/res.partner",
            "/erptest/res.partner/4",
            "/erptest/res.partner/4/abc",
        ] {
            assert_eq!(status(path, &bad, ENTRY).await, 403, "{}", path);
        }
    }

    #[tokio::test]
    async fn unknown_collection_404() {
        let good = auth("admin", "admin");
        assert_eq!(status("/erptest/res.partnerx", &good, ENTRY).await, 404);
        assert_eq!(status("/erptest/res.partnerx/4", &good, ENTRY).await, 404);
        // existence is checked before credentials by default
        assert_eq!(
            status("/erptest/res.partnerx", &auth("bla", "blub"), ENTRY).await,
            404
        );
    }

    #[tokio::test]
    async fn credentials_first_order_reports_403_for_unknown_collection() {
        let config = GatewayConfig {
            check_order: CheckOrder::CredentialsFirst,
            ..Default::default()
        };
        let (dispatcher, _) = dispatcher_with(StubBackend::default(), config);
        let err = post(&dispatcher, "/erptest/res.partnerx", &auth("bla", "blub"), ENTRY)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::AuthInvalid(_)));
    }

    #[tokio::test]
    async fn any_resource_address_is_400_before_body_parsing() {
        let good = auth("admin", "admin");
        for path in [
            "/erptest/res.partner/4",
            "/erptest/res.partner/abc",
            "/erptest/res.partner/-1",
            "/erptest/res.partner/100000000",
            "/erptest/res.partner/4/abc",
        ] {
            let err = post(&dispatcher(), path, &good, b"<entry></content>")
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::ClientAddressing(_)), "{}", path);
        }
    }

    #[tokio::test]
    async fn malformed_body_400_with_prefix() {
        let err = post(
            &dispatcher(),
            "/erptest/res.partner",
            &auth("admin", "admin"),
            b"<entry></content>",
        )
        .await
        .unwrap_err();
        assert_eq!(err.status().as_u16(), 400);
        assert!(err.to_string().starts_with("malformed XML"));
    }

    #[tokio::test]
    async fn schema_violation_400() {
        let err = post(
            &dispatcher(),
            "/erptest/res.partner",
            &auth("admin", "admin"),
            b"<entry><summary>no title</summary></entry>",
        )
        .await
        .unwrap_err();
        assert_eq!(err.status().as_u16(), 400);
        assert!(err.to_string().starts_with("invalid entry"));
    }

    #[tokio::test]
    async fn valid_post_yields_intent() {
        let intent = post(
            &dispatcher(),
            "/erptest/res.partner/",
            &auth("admin", "admin"),
            ENTRY,
        )
        .await
        .unwrap();
        assert_eq!(intent.database, "erptest");
        assert_eq!(intent.collection, "res.partner");
        assert_eq!(intent.entry.title, "Agrolait");
        assert_eq!(
            intent.entry.fields.get("city").map(String::as_str),
            Some("Wavre")
        );
    }

    #[tokio::test]
    async fn authorize_needs_only_path_and_headers() {
        let target = dispatcher()
            .authorize("/erptest/res.partner", &auth("admin", "admin"))
            .await
            .unwrap();
        assert_eq!(
            target,
            PostTarget {
                database: "erptest".into(),
                collection: "res.partner".into(),
            }
        );
    }

    #[tokio::test]
    async fn backend_failure_is_not_a_client_error() {
        let (dispatcher, _) = dispatcher_with(
            StubBackend {
                failing: true,
                ..Default::default()
            },
            GatewayConfig::default(),
        );
        for config_order in [CheckOrder::ExistenceFirst, CheckOrder::CredentialsFirst] {
            let dispatcher = Dispatcher {
                config: GatewayConfig {
                    check_order: config_order,
                    ..Default::default()
                },
                ..dispatcher.clone()
            };
            let err = post(&dispatcher, "/erptest/res.partner", &auth("admin", "admin"), ENTRY)
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::BackendUnavailable(_)));
            assert_eq!(err.status().as_u16(), 503);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out_when_configured() {
        let config = GatewayConfig {
            backend_timeout: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        let (dispatcher, _) = dispatcher_with(
            StubBackend {
                delay: Some(Duration::from_secs(30)),
                ..Default::default()
            },
            config,
        );
        let err = post(&dispatcher, "/erptest/res.partner", &auth("admin", "admin"), ENTRY)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::BackendUnavailable(BackendError::Timeout(2))
        ));
    }

    #[tokio::test]
    async fn checks_stop_at_first_failure() {
        let (dispatcher, backend) =
            dispatcher_with(StubBackend::default(), GatewayConfig::default());
        post(&dispatcher, "/erptest/res.partnerx", &auth("admin", "admin"), ENTRY)
            .await
            .unwrap_err();
        // only the collection lookup ran
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }
}
