use super::value::encode_document;
use super::{check_collection, check_document, DocPath, DocumentStore, Fields};
use crate::config::FirestoreConfig;
use crate::constants::{FIRESTORE_HOST, FIRESTORE_SCOPE};
use crate::error::{LoaderError, Result};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// How requests are authorized.
enum Auth {
    /// Application Default Credentials (GOOGLE_APPLICATION_CREDENTIALS, gcloud, metadata server).
    Adc(Arc<dyn TokenProvider>),
    /// Local emulator, which accepts the fixed "owner" token.
    Emulator,
}

/// Firestore over the REST v1 API.
pub struct FirestoreStore {
    client: Client,
    auth: Auth,
    /// `.../v1/projects/{project}/databases/{database}/documents`
    documents_url: Url,
}

#[derive(Deserialize)]
struct CreatedDocument {
    name: String,
}

impl FirestoreStore {
    /// Connects using FIRESTORE_EMULATOR_HOST when set, otherwise Application Default Credentials.
    pub async fn connect(config: &FirestoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        match std::env::var("FIRESTORE_EMULATOR_HOST") {
            Ok(host) if !host.trim().is_empty() => {
                let project = config
                    .project_id
                    .clone()
                    .unwrap_or_else(|| "demo-painel".to_string());
                info!("Using Firestore emulator at {} (project {})", host, project);
                let base = format!("http://{}", host.trim().trim_end_matches('/'));
                Ok(Self {
                    client,
                    auth: Auth::Emulator,
                    documents_url: documents_url(&base, &project, &config.database_id)?,
                })
            }
            _ => {
                let provider = gcp_auth::provider().await?;
                let project = match &config.project_id {
                    Some(p) => p.clone(),
                    None => provider.project_id().await?.to_string(),
                };
                info!("Connected to Firestore project {} database {}", project, config.database_id);
                Ok(Self {
                    client,
                    auth: Auth::Adc(provider),
                    documents_url: documents_url(FIRESTORE_HOST, &project, &config.database_id)?,
                })
            }
        }
    }

    fn url_for(&self, path: &DocPath) -> Result<Url> {
        let mut url = self.documents_url.clone();
        url.path_segments_mut()
            .map_err(|_| LoaderError::Config(format!("Invalid Firestore base URL {}", self.documents_url)))?
            .extend(path.segments());
        Ok(url)
    }

    async fn authorize(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        match &self.auth {
            Auth::Adc(provider) => {
                let token = provider.token(&[FIRESTORE_SCOPE]).await?;
                Ok(req.bearer_auth(token.as_str()))
            }
            Auth::Emulator => Ok(req.bearer_auth("owner")),
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<reqwest::Response> {
        let resp = self.authorize(req).await?.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LoaderError::Store {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }
}

fn documents_url(host: &str, project: &str, database: &str) -> Result<Url> {
    let mut url = Url::parse(host).map_err(|e| LoaderError::Config(format!("Invalid host {}: {}", host, e)))?;
    url.path_segments_mut()
        .map_err(|_| LoaderError::Config(format!("Invalid host {}", host)))?
        .pop_if_empty()
        .extend(["v1", "projects", project, "databases", database, "documents"]);
    Ok(url)
}

/// Strips `projects/{p}/databases/{d}/documents/` from a resource name.
fn path_from_name(name: &str) -> Option<DocPath> {
    let (_, rest) = name.split_once("/documents/")?;
    let mut segments = rest.split('/');
    let mut path = DocPath::collection(segments.next()?);
    for s in segments {
        path = path.child(s);
    }
    Some(path)
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn create(&self, collection: &DocPath, fields: &Fields) -> Result<DocPath> {
        check_collection(collection)?;
        let url = self.url_for(collection)?;
        let resp = self
            .send(self.client.post(url).json(&encode_document(fields)))
            .await?;
        let created: CreatedDocument = resp.json().await?;
        let path = path_from_name(&created.name).ok_or_else(|| LoaderError::Store {
            status: 200,
            body: format!("unexpected document name {}", created.name),
        })?;
        debug!("Created {}", path);
        Ok(path)
    }

    async fn set(&self, document: &DocPath, fields: &Fields) -> Result<()> {
        check_document(document)?;
        // PATCH without an update mask replaces the whole document, creating it if absent.
        let url = self.url_for(document)?;
        self.send(self.client.patch(url).json(&encode_document(fields)))
            .await?;
        debug!("Set {}", document);
        Ok(())
    }
}
