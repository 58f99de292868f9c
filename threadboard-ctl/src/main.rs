use anyhow::Context;
use threadboard_client::{
    api::{AuthToken, CommentId, NewSession, NewUser, UserId, Uuid},
    Backoff, Board, ViewConfig,
};

mod api;
mod render;
mod watch;

#[derive(structopt::StructOpt)]
struct Opt {
    /// Server base url, eg. http://127.0.0.1:5000
    #[structopt(short, long)]
    host: String,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(structopt::StructOpt)]
enum Command {
    /// Create a user (needs ADMIN_TOKEN)
    CreateUser {
        /// Username
        name: String,

        email: String,

        /// Url of the avatar picture
        #[structopt(long)]
        avatar: Option<String>,
    },

    /// Open a session for a user and print its token (needs ADMIN_TOKEN)
    CreateSession {
        /// Username
        name: String,

        #[structopt(long, default_value = "threadboard-ctl")]
        device: String,
    },

    /// Print the id of the user THREADBOARD_TOKEN belongs to
    Whoami,

    /// Print all comments
    List {
        /// Show every reply, not only the first page of each comment
        #[structopt(long)]
        all: bool,
    },

    /// Post a top-level comment
    Post { content: String },

    /// Reply to a comment
    Reply { parent: Uuid, content: String },

    /// Delete a comment and all replies under it
    Delete { id: Uuid },

    /// Follow the comment feed, printing the board after every change
    Watch {
        /// Show every reply, not only the first page of each comment
        #[structopt(long)]
        all: bool,
    },
}

fn admin_token() -> anyhow::Result<AuthToken> {
    let tok =
        std::env::var("ADMIN_TOKEN").context("retrieving ADMIN_TOKEN environment variable")?;
    let tok = Uuid::try_parse(&tok).context("parsing ADMIN_TOKEN as an auth token")?;
    Ok(AuthToken(tok))
}

fn user_token() -> anyhow::Result<Option<AuthToken>> {
    match std::env::var("THREADBOARD_TOKEN") {
        Err(_) => Ok(None),
        Ok(tok) => Ok(Some(AuthToken(
            Uuid::try_parse(&tok).context("parsing THREADBOARD_TOKEN as an auth token")?,
        ))),
    }
}

async fn board(api: &api::Api) -> anyhow::Result<Board> {
    let viewer = match api.is_logged_in() {
        true => Some(api.whoami().await.context("recovering current user")?),
        false => None,
    };
    Ok(Board::new(ViewConfig::default(), viewer))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let opt = <Opt as structopt::StructOpt>::from_args();

    let api = api::Api::new(opt.host, user_token()?);

    match opt.cmd {
        Command::CreateUser {
            name,
            email,
            avatar,
        } => {
            let user = NewUser::new(UserId(Uuid::new_v4()), name, email, avatar);
            user.validate().map_err(|e| anyhow::anyhow!(e.message()))?;
            api.create_user(admin_token()?, &user).await?;
            println!("{}", user.id.0);
        }
        Command::CreateSession { name, device } => {
            let tok = api
                .create_session(admin_token()?, &NewSession { user: name, device })
                .await?;
            println!("{}", tok.0);
        }
        Command::Whoami => {
            println!("{}", api.whoami().await?.0);
        }
        Command::List { all } => {
            let mut board = board(&api).await?;
            board.receive_forest(api.fetch_comments().await?);
            render::expand_all(&mut board, all);
            print!("{}", render::render(&board));
        }
        Command::Post { content } => {
            let mut board = board(&api).await?;
            board.view_mut().root_draft = content;
            let c = board
                .view_mut()
                .submit_root()
                .map_err(|e| anyhow::anyhow!(e.message()))?;
            println!("{}", api.create_comment(&c).await?.id.0);
        }
        Command::Reply { parent, content } => {
            let parent = CommentId(parent);
            let mut board = board(&api).await?;
            board.view_mut().set_draft(parent, content);
            let c = board
                .view_mut()
                .submit_reply(parent)
                .map_err(|e| anyhow::anyhow!(e.message()))?;
            println!("{}", api.create_comment(&c).await?.id.0);
        }
        Command::Delete { id } => {
            let res = api.delete_comment(CommentId(id)).await?;
            println!("{} ({} comments removed)", res.message, res.deleted);
        }
        Command::Watch { all } => {
            let mut board = board(&api).await?;
            watch::watch(&api, &mut board, Backoff::default(), all).await?;
        }
    }

    Ok(())
}
