use facilita_auth::{
    auth::FileStore,
    session::{AuthState, Navigator},
    Client,
};
use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};
use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, StructOpt)]
struct Opt {
    /// Keep the session in this directory instead of in memory.
    #[structopt(long, parse(from_os_str))]
    store_dir: Option<PathBuf>,

    /// The route the app pretends to be on.
    #[structopt(long, default_value = "/")]
    route: String,

    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, StructOpt)]
enum Cmd {
    /// Sign in with email and password
    SignIn { email: String, password: String },
    /// Register an account
    SignUp { email: String, password: String },
    /// Sign out
    SignOut,
    /// Show who is signed in
    Whoami,
}

/// Prints route changes instead of rendering pages.
#[derive(Debug)]
struct PrintNavigator(Mutex<String>);

impl Navigator for PrintNavigator {
    fn current_route(&self) -> String {
        self.0.lock().unwrap().clone()
    }

    fn navigate(&self, route: &str) {
        println!("-> {}", route);
        *self.0.lock().unwrap() = route.to_string();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opt = Opt::from_args();
    let mut builder = Client::builder();
    if let Some(dir) = opt.store_dir {
        builder = builder.with_store(Arc::new(FileStore::new(dir)));
    }
    let client = builder.build()?;

    let sessions = client
        .session_manager()
        .with_navigator(Arc::new(PrintNavigator(Mutex::new(opt.route))))
        .build();
    let _guard = sessions.init().await;

    match opt.cmd {
        Cmd::SignIn { email, password } => sessions.sign_in(&email, &password).await?,
        Cmd::SignUp { email, password } => {
            sessions.sign_up(&email, &password).await?;
            println!("Check {} for the confirmation link", email);
        }
        Cmd::SignOut => sessions.sign_out().await?,
        Cmd::Whoami => match sessions.state() {
            AuthState::Authenticated(user) => println!("{} ({})", user.email, user.id),
            _ => println!("Not signed in"),
        },
    }

    Ok(())
}
