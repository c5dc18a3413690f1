use http::header;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use url::Url;

use crate::error::{AuthError, Error, ErrorBody, Result};

pub(crate) static USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Client is a wrapper around `reqwest::Client` which provides automatically
/// prepending the base url and the anon key headers.
#[derive(Debug, Clone)]
pub(crate) struct Client {
    base_url: Url,
    inner: reqwest::Client,
}

#[derive(Clone)]
pub(crate) enum Body {
    Empty,
    Json(serde_json::Value),
}

impl Client {
    /// Creates a new client.
    pub(crate) fn new<U, K>(base_url: U, anon_key: K) -> Result<Self>
    where
        U: AsRef<str>,
        K: AsRef<str>,
    {
        let base_url = Url::parse(base_url.as_ref()).map_err(Error::InvalidUrl)?;
        let anon_key = anon_key.as_ref();

        let mut default_headers = header::HeaderMap::new();
        let key_header_value =
            header::HeaderValue::from_str(anon_key).map_err(|_e| Error::InvalidAnonKey)?;
        default_headers.insert("apikey", key_header_value);
        // Requests made on behalf of a user override this with their token.
        let bearer_header_value = header::HeaderValue::from_str(&format!("Bearer {anon_key}"))
            .map_err(|_e| Error::InvalidAnonKey)?;
        default_headers.insert(header::AUTHORIZATION, bearer_header_value);

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(default_headers)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(Error::HttpClientSetup)?;

        Ok(Self {
            base_url,
            inner: http_client,
        })
    }

    /// The host of the auth service, used to derive the storage key.
    pub(crate) fn host(&self) -> Option<&str> {
        self.base_url.host_str()
    }

    async fn execute<P>(
        &self,
        method: http::Method,
        path: P,
        body: Body,
        bearer: Option<&str>,
    ) -> Result<Response>
    where
        P: AsRef<str>,
    {
        let url = self
            .base_url
            .join(path.as_ref().trim_start_matches('/'))
            .map_err(Error::InvalidUrl)?;

        let mut req = self.inner.request(method.clone(), url);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        if let Body::Json(value) = body {
            req = req.json(&value);
        }

        // No retries here, only the session manager retries (and only on
        // rate limiting).
        let res = self
            .inner
            .execute(req.build().map_err(Error::Http)?)
            .await
            .map_err(Error::Http)?;

        Ok(Response::new(res, method, path.as_ref().to_string()))
    }

    pub(crate) async fn get<S>(&self, path: S, bearer: Option<&str>) -> Result<Response>
    where
        S: AsRef<str>,
    {
        self.execute(http::Method::GET, path, Body::Empty, bearer)
            .await
    }

    pub(crate) async fn post<S, P>(
        &self,
        path: S,
        payload: P,
        bearer: Option<&str>,
    ) -> Result<Response>
    where
        S: AsRef<str>,
        P: Serialize,
    {
        self.execute(
            http::Method::POST,
            path,
            Body::Json(serde_json::to_value(payload).map_err(Error::Serialize)?),
            bearer,
        )
        .await
    }

    pub(crate) async fn post_empty<S>(&self, path: S, bearer: Option<&str>) -> Result<Response>
    where
        S: AsRef<str>,
    {
        self.execute(http::Method::POST, path, Body::Empty, bearer)
            .await
    }
}

#[derive(Debug)]
pub(crate) struct Response {
    inner: reqwest::Response,
    method: http::Method,
    path: String,
}

impl Response {
    pub(crate) fn new(inner: reqwest::Response, method: http::Method, path: String) -> Self {
        Self {
            inner,
            method,
            path,
        }
    }

    pub(crate) async fn json<T: DeserializeOwned>(self) -> Result<T> {
        self.check_error()
            .await?
            .inner
            .json::<T>()
            .await
            .map_err(Error::Deserialize)
    }

    pub(crate) async fn check_error(self) -> Result<Response> {
        let status = self.inner.status();
        if !status.is_success() {
            // Decoding may fail (empty body, proxy error page), we still
            // want an AuthError.
            let body = self.inner.json::<ErrorBody>().await.ok();
            return Err(Error::Auth(AuthError::new(
                status.as_u16(),
                self.method,
                self.path,
                body,
            )));
        }

        Ok(self)
    }
}
