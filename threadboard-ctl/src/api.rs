use anyhow::{anyhow, Context};
use threadboard_client::api::{
    self, AuthToken, Comment, CommentId, CommentNode, DeleteConfirmation, NewComment, NewSession,
    NewUser, UserId,
};

/// Thin wrapper around the server's HTTP interface
pub struct Api {
    client: reqwest::Client,
    host: String,
    token: Option<AuthToken>,
}

async fn parse<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> anyhow::Result<T> {
    if resp.status().is_success() {
        let body = resp.bytes().await.context("reading response body")?;
        return api::from_json(&body).context("parsing response body");
    }
    let status = resp.status();
    let body = resp.bytes().await.context("reading error response body")?;
    let err = api::Error::parse(&body)
        .with_context(|| format!("parsing error response with status {status}"))?;
    let message = err.message();
    Err(anyhow::Error::new(err).context(message))
}

impl Api {
    pub fn new(host: String, token: Option<AuthToken>) -> Api {
        Api {
            client: reqwest::Client::new(),
            host: String::from(host.trim_end_matches('/')),
            token,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.is_some()
    }

    fn token(&self) -> anyhow::Result<AuthToken> {
        self.token
            .ok_or_else(|| anyhow!("THREADBOARD_TOKEN must be set for this command"))
    }

    /// Websocket url of the comment feed
    pub fn feed_url(&self) -> anyhow::Result<String> {
        let rest = self
            .host
            .strip_prefix("http")
            .ok_or_else(|| anyhow!("host {:?} does not start with http", self.host))?;
        Ok(format!("ws{rest}/ws/comment-feed"))
    }

    pub async fn create_user(&self, admin: AuthToken, user: &NewUser) -> anyhow::Result<()> {
        self.client
            .post(format!("{}/api/admin/create-user", self.host))
            .json(user)
            .bearer_auth(admin.0)
            .send()
            .await
            .context("sending create-user request")?
            .error_for_status()?;
        Ok(())
    }

    pub async fn create_session(
        &self,
        admin: AuthToken,
        session: &NewSession,
    ) -> anyhow::Result<AuthToken> {
        let resp = self
            .client
            .post(format!("{}/api/admin/create-session", self.host))
            .json(session)
            .bearer_auth(admin.0)
            .send()
            .await
            .context("sending create-session request")?;
        parse(resp).await
    }

    pub async fn whoami(&self) -> anyhow::Result<UserId> {
        let resp = self
            .client
            .get(format!("{}/api/whoami", self.host))
            .bearer_auth(self.token()?.0)
            .send()
            .await
            .context("sending whoami request")?;
        parse(resp).await
    }

    pub async fn fetch_comments(&self) -> anyhow::Result<Vec<CommentNode>> {
        let resp = self
            .client
            .get(format!("{}/api/comments", self.host))
            .send()
            .await
            .context("fetching comments")?;
        parse(resp).await
    }

    pub async fn create_comment(&self, c: &NewComment) -> anyhow::Result<Comment> {
        let resp = self
            .client
            .post(format!("{}/api/comments", self.host))
            .json(c)
            .bearer_auth(self.token()?.0)
            .send()
            .await
            .context("sending comment")?;
        parse(resp).await
    }

    pub async fn delete_comment(&self, c: CommentId) -> anyhow::Result<DeleteConfirmation> {
        let resp = self
            .client
            .delete(format!("{}/api/comments/{}", self.host, c.0))
            .bearer_auth(self.token()?.0)
            .send()
            .await
            .context("sending deletion request")?;
        parse(resp).await
    }
}
