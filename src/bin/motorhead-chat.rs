//! Interactive chat whose history lives in Motorhead.
//!
//! Each line typed is sent to an OpenAI-compatible model together with the conversation the
//! Motorhead server remembers for the session. The reply streams in as it is generated.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: session davemustaine666 on http://localhost:8080, gpt-3.5-turbo
//! motorhead-chat
//!
//! # Another session on another server
//! motorhead-chat --session-id ozzy6666 --memory-url http://motorhead:8000
//!
//! # Hosted Motorhead (also picked up from METAL_API_KEY / METAL_CLIENT_ID)
//! motorhead-chat --metal-api-key KEY --metal-client-id ID
//!
//! # Disable colors (useful for piping output)
//! motorhead-chat --no-color
//! ```
//!
//! Settings may also come from a `.env` file or the environment: `OPENAI_API_KEY`,
//! `OPENAI_API_BASE`, `MOTORHEAD_URL`, `MOTORHEAD_SESSION_ID`, `MOTORHEAD_CHAT_MODEL`,
//! `METAL_API_KEY`, `METAL_CLIENT_ID`.
//! Press Ctrl-C or Ctrl-D to end the conversation.

use std::process::ExitCode;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use motorhead_chat::render::error_line;
use motorhead_chat::{
    ChatArgs, ChatConfig, ChatOpenAi, ChatPromptTemplate, ConversationChain, Error, Interrupt,
    MotorheadMemory, OpenAi, Printer, Result, StreamingStdoutHandler, TurnLoop,
};

fn main() -> ExitCode {
    let (args, _) = ChatArgs::from_command_line_relaxed("motorhead-chat [OPTIONS]");
    let use_color = !args.no_color;
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", error_line(&err, use_color));
            ExitCode::FAILURE
        }
    }
}

fn run(args: ChatArgs) -> Result<()> {
    load_dotenv()?;
    init_tracing();

    let config = ChatConfig::from_env(args)?;
    debug!(?config, "configuration resolved");

    // Installed first so Ctrl-C during startup still ends with the farewell.
    let interrupt = Interrupt::new();
    let trigger = interrupt.clone();
    ctrlc::set_handler(move || trigger.trigger())
        .map_err(|err| Error::configuration(format!("failed to install Ctrl-C handler: {err}")))?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| Error::io("failed to start async runtime", err))?;

    let client = OpenAi::with_options(config.api_key.clone(), config.api_base.clone(), None)?;
    let llm = ChatOpenAi::new(client, config.model.clone()).with_temperature(config.temperature);
    let mut printer = Printer::stdout(config.use_color);

    // Memory must load before anything is shown; a dead server ends the process here.
    let mut memory = MotorheadMemory::with_options(
        &config.memory_url,
        config.session_id.clone(),
        config.memory_options(),
    )?;
    match runtime.block_on(interrupt.race(memory.init())) {
        Ok(()) => {}
        Err(err) if err.is_abort() => {
            printer.farewell()?;
            return Ok(());
        }
        Err(err) => return Err(err),
    }

    let chain = ConversationChain::new(memory, llm, ChatPromptTemplate::conversation());
    let handler =
        StreamingStdoutHandler::with_color(config.use_color).with_interrupt(interrupt.clone());
    printer.banner()?;

    let mut editor = DefaultEditor::new()?;
    let mut turn_loop = TurnLoop::new(chain, handler, printer).with_interrupt(interrupt);
    turn_loop.run(&runtime, &mut editor)?;
    Ok(())
}

fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(Error::configuration(format!("failed to load .env: {err}"))),
    }
}

fn init_tracing() {
    // Logs go to stderr so they never interleave with streamed tokens on stdout.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
