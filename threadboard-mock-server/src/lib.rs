use std::collections::{btree_map, BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use threadboard_api::{
    self as api, AuthToken, Comment, CommentId, CommentNode, DeleteConfirmation, Error,
    FeedMessage, NewComment, NewSession, NewUser, User, UserId, Uuid,
};
use tokio::sync::mpsc;

/// In-memory model of the server, against which the server gets compared
pub struct MockServer {
    users: BTreeMap<UserId, User>,
    sessions: HashMap<AuthToken, Device>,
    comments: Vec<Comment>,
    feeds: Vec<mpsc::UnboundedSender<FeedMessage>>,
}

#[derive(Debug)]
struct Device {
    user: UserId,
    _name: String,
}

struct MemDb<'a>(&'a mut Vec<Comment>);

#[async_trait]
impl<'a> api::Db for MemDb<'a> {
    async fn comment_author(&mut self, c: CommentId) -> anyhow::Result<Option<UserId>> {
        Ok(self.0.iter().find(|x| x.id == c).map(|x| x.author_id))
    }

    async fn list_replies(&mut self, c: CommentId) -> anyhow::Result<Vec<CommentId>> {
        Ok(self
            .0
            .iter()
            .filter(|x| x.parent_id == Some(c))
            .map(|x| x.id)
            .collect())
    }

    async fn remove_comment(&mut self, c: CommentId) -> anyhow::Result<()> {
        self.0.retain(|x| x.id != c);
        Ok(())
    }
}

impl MockServer {
    pub fn new() -> MockServer {
        MockServer {
            users: BTreeMap::new(),
            sessions: HashMap::new(),
            comments: Vec::new(),
            feeds: Vec::new(),
        }
    }

    /// Return the name of user number `id`
    pub fn test_get_user_name(&self, id: usize) -> &str {
        let u = self
            .users
            .values()
            .nth(id)
            .unwrap_or_else(|| panic!("getting user {id} among {}", self.users.len()));
        &u.name
    }

    /// Return the current number of users
    pub fn test_num_users(&self) -> usize {
        self.users.len()
    }

    /// Return the current number of comments
    pub fn test_num_comments(&self) -> usize {
        self.comments.len()
    }

    fn relay(&mut self, msg: FeedMessage) {
        self.feeds.retain(|f| f.send(msg.clone()).is_ok());
    }

    pub fn admin_create_user(&mut self, u: NewUser) -> Result<(), Error> {
        u.validate()?;

        if self.users.values().any(|x| x.name == u.name) {
            return Err(Error::NameAlreadyUsed(u.name));
        }

        match self.users.entry(u.id) {
            btree_map::Entry::Occupied(_) => Err(Error::UuidAlreadyUsed(u.id.0)),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(User::from(u));
                Ok(())
            }
        }
    }

    pub fn admin_create_session(&mut self, s: NewSession) -> Result<AuthToken, Error> {
        s.validate()?;
        let user = self
            .users
            .values()
            .find(|u| u.name == s.user)
            .ok_or(Error::PermissionDenied)?
            .id;
        let tok = AuthToken(Uuid::new_v4());
        self.sessions.insert(
            tok,
            Device {
                user,
                _name: s.device,
            },
        );
        Ok(tok)
    }

    fn resolve(&self, tok: AuthToken) -> Result<&User, Error> {
        self.sessions
            .get(&tok)
            .and_then(|d| self.users.get(&d.user))
            .ok_or(Error::PermissionDenied)
    }

    pub fn whoami(&self, tok: AuthToken) -> Result<UserId, Error> {
        Ok(self.resolve(tok)?.id)
    }

    pub fn fetch_comments(&self) -> Vec<CommentNode> {
        api::build_forest(self.comments.clone())
    }

    pub fn create_comment(&mut self, tok: AuthToken, c: NewComment) -> Result<Comment, Error> {
        let user = self.resolve(tok)?.clone();
        let content = c.validate()?;
        if let Some(parent) = c.parent_id {
            if !self.comments.iter().any(|x| x.id == parent) {
                return Err(Error::NotFound(parent));
            }
        }
        let now = Utc::now();
        let comment = Comment {
            id: CommentId(Uuid::new_v4()),
            author_id: user.id,
            author: api::Author {
                name: user.name,
                avatar: user.avatar,
                email: None,
            },
            content,
            parent_id: c.parent_id,
            created_at: now,
            updated_at: now,
        };
        self.comments.push(comment.clone());
        self.relay(FeedMessage::CommentCreated(comment.clone()));
        let mut echo = comment;
        echo.author.email = Some(user.email);
        Ok(echo)
    }

    pub async fn delete_comment(
        &mut self,
        tok: AuthToken,
        id: CommentId,
    ) -> Result<DeleteConfirmation, Error> {
        let user = self.resolve(tok)?.id;
        let deleted = api::delete_thread(&mut MemDb(&mut self.comments), user, id)
            .await
            .map_err(|e| Error::Unknown(format!("{e:?}")))??;
        self.relay(FeedMessage::CommentDeleted(id));
        Ok(DeleteConfirmation::new(deleted.len()))
    }

    pub fn comment_feed(&mut self) -> mpsc::UnboundedReceiver<FeedMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.feeds.push(sender);
        receiver
    }
}

impl Default for MockServer {
    fn default() -> MockServer {
        MockServer::new()
    }
}
