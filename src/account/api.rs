//! Minimal client for the LiDARMill REST API.
//!
//! Every response of the API is wrapped in an envelope with a `data` field,
//! and errors carry a `message` field. Only the routes required to walk an
//! account down to its data files are bound here.
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{UtilError, UtilResult};

/// Default host of the LiDARMill API.
pub const DEFAULT_HOST: &str = "https://api.lidarmill.com";

/// Envelope wrapping every API response.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// Body returned by the API on failure.
#[derive(Debug, Default, Deserialize)]
struct Failure {
    message: Option<String>,
}

/// Credentials posted to the login route.
#[derive(Debug, Serialize)]
struct Login<'a> {
    email: &'a str,
    password: &'a str,
}

/// Session returned on a successful login.
#[derive(Debug, Deserialize)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Account owner of a session.
#[derive(Debug, Deserialize)]
pub struct User {
    #[serde(deserialize_with = "id")]
    pub id: String,
}

/// Project as listed for a user.
#[derive(Debug, Deserialize)]
pub struct Project {
    #[serde(deserialize_with = "id")]
    pub id: String,
    pub name: String,
}

/// Artifact attached to a project.
#[derive(Debug, Deserialize)]
pub struct Artifact {
    #[serde(deserialize_with = "id")]
    pub id: String,
    pub name: String,
    pub artifact_type: String,
}

/// Artifact type of web viewer tiles, which are never downloaded.
pub const POTREE: &str = "potree";

/// Artifact type of camera data, stored as data directories.
pub const CAMERA_DATA: &str = "camera_data";

impl Artifact {
    /// Determines whether this artifact stores its files in data directories.
    pub fn is_camera_data(&self) -> bool {
        self.artifact_type == CAMERA_DATA
    }

    /// Determines whether this artifact should be downloaded at all.
    pub fn is_wanted(&self, skip_cam: bool) -> bool {
        match self.artifact_type.as_str() {
            POTREE => false,
            CAMERA_DATA => !skip_cam,
            _ => true,
        }
    }
}

/// Data directory reference attached to a camera artifact.
#[derive(Debug, Deserialize)]
pub struct DataDirectoryRef {
    #[serde(deserialize_with = "id")]
    pub id: String,
}

/// Detailed data directory, listing the URLs of its files.
#[derive(Debug, Deserialize)]
pub struct DataDirectory {
    #[serde(default)]
    pub file_index: Vec<String>,
}

/// Data file attached to a non-camera artifact.
#[derive(Debug, Deserialize)]
pub struct DataFile {
    pub s3_link: String,
    pub file_name: String,
}

/// Identifiers are UUID strings, but older records use integers.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

/// Deserializes an identifier of either form into a `String`.
fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(id) => id,
        RawId::Number(id) => id.to_string(),
    })
}

/// Authenticated client against the API.
pub struct MillClient {
    http: Client,
    host: String,
    token: Option<String>,
}

impl MillClient {
    /// Constructs a new, unauthenticated client against a host.
    pub fn new(http: Client, host: &str) -> Self {
        Self {
            http,
            host: host.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    /// Logs in using an email and password, storing the session token.
    pub async fn login(&mut self, email: &str, password: &str) -> UtilResult<User> {
        let response = self
            .http
            .post(&self.url("/login"))
            .json(&Login { email, password })
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(format!("Login failed with status {}", response.status()).into());
        }

        let session = parse::<Session>(&response.text().await?)?;
        self.token = Some(session.token);

        Ok(session.user)
    }

    /// Lists all projects owned by a user.
    pub async fn projects(&self, user_id: &str) -> UtilResult<Vec<Project>> {
        self.get(&format!("/users/{}/projects", user_id)).await
    }

    /// Lists all artifacts of a project.
    pub async fn artifacts(&self, project_id: &str) -> UtilResult<Vec<Artifact>> {
        self.get(&format!("/projects/{}/artifacts", project_id)).await
    }

    /// Lists the data directories of a camera artifact.
    pub async fn data_directories(&self, artifact_id: &str) -> UtilResult<Vec<DataDirectoryRef>> {
        self.get(&format!("/artifacts/{}/data_directories", artifact_id))
            .await
    }

    /// Fetches the detail of a data directory, including its file index.
    pub async fn data_directory(&self, directory_id: &str) -> UtilResult<DataDirectory> {
        self.get(&format!("/data_directories/{}", directory_id)).await
    }

    /// Lists the data files of an artifact.
    pub async fn data_files(&self, artifact_id: &str) -> UtilResult<Vec<DataFile>> {
        self.get(&format!("/artifacts/{}/data_files", artifact_id))
            .await
    }

    /// Sends an authenticated GET request, unwrapping the `data` envelope.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> UtilResult<T> {
        let url = self.url(path);
        let mut request = self.http.get(&url);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(failure(&url, status, &body));
        }

        parse(&body)
    }

    /// Joins a route onto the configured host.
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }
}

/// Parses a response body and unwraps its `data` envelope.
fn parse<T: DeserializeOwned>(body: &str) -> UtilResult<T> {
    Ok(serde_json::from_str::<Envelope<T>>(body)?.data)
}

/// Builds an error for a failed request, including the server message.
fn failure(url: &str, status: StatusCode, body: &str) -> UtilError {
    let message = serde_json::from_str::<Failure>(body)
        .unwrap_or_default()
        .message
        .unwrap_or_else(|| body.to_string());

    format!(
        "GET request to the backend failed: {} (status {}): {}",
        url, status, message
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::{Artifact, DataDirectory, DataFile, Project, Session};
    use reqwest::StatusCode;

    #[test]
    fn parsing_login_sessions() {
        let body = r#"{"data":{"token":"abc.def","user":{"id":42,"email":"a@b.c"}}}"#;
        let session = super::parse::<Session>(body).unwrap();

        assert_eq!(session.token, "abc.def");
        assert_eq!(session.user.id, "42");
    }

    #[test]
    fn parsing_projects_and_artifacts() {
        let projects = super::parse::<Vec<Project>>(
            r#"{"data":[{"id":"950bdbb5-c642-48e0-91c8-f1ab73eabc53","name":"Bridge"}]}"#,
        )
        .unwrap();

        let artifacts = super::parse::<Vec<Artifact>>(
            r#"{"data":[
                {"id":"a1","name":"Cloud","artifact_type":"point_cloud"},
                {"id":"a2","name":"Viewer","artifact_type":"potree"},
                {"id":"a3","name":"Photos","artifact_type":"camera_data"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(projects[0].id, "950bdbb5-c642-48e0-91c8-f1ab73eabc53");
        assert_eq!(projects[0].name, "Bridge");
        assert_eq!(artifacts.len(), 3);
        assert!(artifacts[2].is_camera_data());
    }

    #[test]
    fn filtering_unwanted_artifacts() {
        let artifact = |kind: &str| Artifact {
            id: "1".into(),
            name: "a".into(),
            artifact_type: kind.into(),
        };

        assert!(artifact("point_cloud").is_wanted(false));
        assert!(artifact("point_cloud").is_wanted(true));
        assert!(artifact("camera_data").is_wanted(false));
        assert!(!artifact("camera_data").is_wanted(true));
        assert!(!artifact("potree").is_wanted(false));
        assert!(!artifact("potree").is_wanted(true));
    }

    #[test]
    fn parsing_data_files_and_directories() {
        let files = super::parse::<Vec<DataFile>>(
            r#"{"data":[{"s3_link":"https://s3/x?sig=1","file_name":"x.las","size":3}]}"#,
        )
        .unwrap();
        let directory = super::parse::<DataDirectory>(r#"{"data":{"id":"d1"}}"#).unwrap();

        assert_eq!(files[0].s3_link, "https://s3/x?sig=1");
        assert_eq!(files[0].file_name, "x.las");
        assert!(directory.file_index.is_empty());
    }

    #[test]
    fn describing_failed_requests() {
        let err = super::failure(
            "https://api/projects/1/artifacts",
            StatusCode::FORBIDDEN,
            r#"{"message":"Not allowed"}"#,
        );

        assert_eq!(
            err.to_string(),
            "GET request to the backend failed: https://api/projects/1/artifacts (status 403 Forbidden): Not allowed"
        );
    }
}
