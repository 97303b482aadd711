use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use rolesync_core::{AppError, AppResult};

/// Returns the URL with a trailing slash so relative joins append to its path.
pub(crate) fn base_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

pub(crate) fn endpoint(base: &Url, path: &str) -> AppResult<Url> {
    base.join(path)
        .map_err(|error| AppError::Internal(format!("invalid endpoint '{path}': {error}")))
}

/// Sends a request and maps transport failures and error statuses.
pub(crate) async fn send(builder: RequestBuilder, action: &str) -> AppResult<Response> {
    let response = builder
        .send()
        .await
        .map_err(|error| AppError::Upstream(format!("{action} transport error: {error}")))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<response body unavailable>".to_owned());
    if status == StatusCode::NOT_FOUND {
        return Err(AppError::NotFound(format!("{action}: {body}")));
    }

    Err(AppError::Upstream(format!(
        "{action} failed with status {status}: {body}"
    )))
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    action: &str,
) -> AppResult<T> {
    response.json::<T>().await.map_err(|error| {
        AppError::Upstream(format!("{action} returned an invalid payload: {error}"))
    })
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::{base_url, endpoint};

    #[test]
    fn endpoints_append_to_base_path() {
        let base = Url::parse("https://api.example.com/cf")
            .map(base_url)
            .unwrap_or_else(|error| panic!("{error}"));

        let url = endpoint(&base, "v3/roles").unwrap_or_else(|error| panic!("{error}"));

        assert_eq!(url.as_str(), "https://api.example.com/cf/v3/roles");
    }
}
