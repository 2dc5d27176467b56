use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures_util::StreamExt;

use chatbridge_core_sdk::{
    auth,
    chat::{self, ProviderRoute},
    config::ChatConfig,
    db,
    models::{ChatRequest, ChatSettings, Message, SessionUser},
    server::{self, AppState},
    telemetry,
};

/**
 * \brief ChatBridge command line entry point.
 */
#[derive(Parser, Debug)]
#[command(name = "chatbridge", version, about = "Stream LLM chats to the browser and keep transcripts")]
struct Cli {
    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

/**
 * \brief Settings shared by every subcommand; each falls back to its environment variable.
 */
#[derive(Args, Debug)]
struct SettingsArgs {
    #[arg(long, env = "CHATBRIDGE_DB", default_value = db::DEFAULT_DB_PATH, global = true)]
    db: PathBuf,
    #[arg(long, env = "GOOGLE_GEMINI_API_KEY", default_value = "", hide_env_values = true, global = true)]
    gemini_api_key: String,
    #[arg(long, env = "OPENROUTER_API_KEY", default_value = "", hide_env_values = true, global = true)]
    openrouter_api_key: String,
    #[arg(long, env = "SYSTEM_MESSAGE", global = true)]
    system_message: Option<String>,
    #[arg(long, env = "OPENAI_MODEL", global = true)]
    openai_model: Option<String>,
    #[arg(long, env = "GEMINI_MODEL", global = true)]
    gemini_model: Option<String>,
    #[arg(long, env = "GEMINI_API_BASE", default_value = chatbridge_core_sdk::llm::GEMINI_DEFAULT_BASE, global = true)]
    gemini_api_base: String,
    #[arg(long, env = "OPENROUTER_API_BASE", default_value = chatbridge_core_sdk::llm::OPENROUTER_DEFAULT_BASE, global = true)]
    openrouter_api_base: String,
}

impl From<SettingsArgs> for ChatConfig {
    fn from(args: SettingsArgs) -> Self {
        ChatConfig {
            gemini_api_key: args.gemini_api_key,
            openrouter_api_key: args.openrouter_api_key,
            system_message: args.system_message,
            openai_model: args.openai_model,
            gemini_model: args.gemini_model,
            gemini_api_base: args.gemini_api_base,
            openrouter_api_base: args.openrouter_api_base,
            db_path: args.db,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Google,
    Openrouter,
}

impl From<ProviderArg> for ProviderRoute {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Google => ProviderRoute::Google,
            ProviderArg::Openrouter => ProviderRoute::OpenRouter,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief Start the HTTP API.
     */
    Serve {
        #[arg(long, env = "CHATBRIDGE_ADDR", default_value = "127.0.0.1:3000")]
        addr: String,
    },

    /**
     * \brief Create a bearer token for a user.
     */
    IssueToken {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        name: Option<String>,
    },

    /**
     * \brief Send one prompt, stream the reply to stdout and save the chat.
     */
    Chat {
        #[arg(long, value_enum, default_value = "openrouter")]
        provider: ProviderArg,
        #[arg(long)]
        prompt: String,
        #[arg(long, default_value = "local")]
        user_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        temperature: Option<f64>,
        #[arg(long)]
        chat_id: Option<String>,
    },

    /**
     * \brief List saved chats for a user.
     */
    History {
        #[arg(long, default_value = "local")]
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init("info,tower_http=info");

    let cli = Cli::parse();
    let config = ChatConfig::from(cli.settings);

    match cli.command {
        Commands::Serve { addr } => {
            let state = AppState::from_config(config).context("open database failed")?;
            server::run(&addr, state).await?;
        }
        Commands::IssueToken { user_id, name } => {
            let conn = db::open_db(&config.db_path).context("open database failed")?;
            db::migrate(&conn).context("apply migrations failed")?;
            let token = auth::new_session_token();
            db::insert_session(&conn, &token, &user_id, name.as_deref())
                .context("save session failed")?;
            println!("{}", token);
        }
        Commands::Chat {
            provider,
            prompt,
            user_id,
            name,
            model,
            temperature,
            chat_id,
        } => {
            let state = AppState::from_config(config).context("open database failed")?;
            let request = ChatRequest {
                id: chat_id,
                chat_settings: Some(ChatSettings { model, temperature }),
                messages: vec![Message::user(prompt)],
                preview_token: None,
            };
            let user = SessionUser { id: user_id, name };

            let mut stream = chat::start_chat(&state, provider.into(), request, user)
                .await
                .context("create stream failed")?;
            let mut stdout = std::io::stdout();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.context("stream error")?;
                stdout.write_all(&chunk)?;
                stdout.flush().ok();
            }
            println!();
        }
        Commands::History { user_id } => {
            let conn = db::open_db(&config.db_path).context("open database failed")?;
            db::migrate(&conn).context("apply migrations failed")?;
            let chats = db::list_chats(&conn, &user_id).context("list chats failed")?;
            if chats.is_empty() {
                println!("No chats for {}", user_id);
            }
            for chat in chats {
                println!("{}\t{}\t{}", chat.id, chat.path, chat.title);
            }
        }
    }

    Ok(())
}
