use std::{error::Error, io::Write};

use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    style::Print,
    terminal,
    terminal::ClearType,
};
use engine::{CreateGroupCmd, Engine, EngineError, GroupKind, MemberRole};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};

#[derive(Parser, Debug)]
#[command(name = "splitpot_admin")]
#[command(about = "Admin utilities for Splitpot (bootstrap users/groups)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./splitpot.db?mode=rwc"
    )]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    User(User),
    Group(Group),
}

#[derive(Args, Debug)]
struct User {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    Create(UserCreateArgs),
    /// Attach a payment gateway customer to a user.
    LinkPayment(LinkPaymentArgs),
}

#[derive(Args, Debug)]
struct UserCreateArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    display_name: Option<String>,
}

#[derive(Args, Debug)]
struct LinkPaymentArgs {
    #[arg(long)]
    username: String,
    #[arg(long)]
    customer_ref: String,
}

#[derive(Args, Debug)]
struct Group {
    #[command(subcommand)]
    command: GroupCommand,
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
    Create(GroupCreateArgs),
    /// Add an active member, skipping the invite round trip.
    AddMember(AddMemberArgs),
}

#[derive(Args, Debug)]
struct GroupCreateArgs {
    #[arg(long)]
    owner: String,
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "friends")]
    kind: String,
    /// Percentage of active members that must approve a trade.
    #[arg(long)]
    threshold: Option<u8>,
}

#[derive(Args, Debug)]
struct AddMemberArgs {
    #[arg(long)]
    group: String,
    #[arg(long)]
    username: String,
    #[arg(long, default_value = "member")]
    role: String,
    /// Owner or admin performing the change.
    #[arg(long)]
    actor: String,
}

fn exit_on_error<T>(result: Result<T, EngineError>, code: i32) -> T {
    match result {
        Ok(v) => v,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(code);
        }
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self, Box<dyn Error + Send + Sync>> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn prompt_password(prompt: &str) -> Result<String, Box<dyn Error + Send + Sync>> {
    let _raw = RawModeGuard::enter()?;

    let mut out = std::io::stderr();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(prompt)
    )?;
    out.flush()?;

    let mut buf = String::new();
    loop {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };

        match code {
            KeyCode::Enter => {
                execute!(out, Print("\r\n"))?;
                out.flush()?;
                break;
            }
            KeyCode::Backspace => {
                if buf.pop().is_some() {
                    execute!(out, cursor::MoveLeft(1), Print(" "), cursor::MoveLeft(1))?;
                    out.flush()?;
                }
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                execute!(out, Print("\r\n"))?;
                out.flush()?;
                return Err("interrupted".into());
            }
            KeyCode::Char(ch) if !modifiers.contains(KeyModifiers::CONTROL) => {
                buf.push(ch);
                execute!(out, Print("*"))?;
                out.flush()?;
            }
            _ => {}
        }
    }

    Ok(buf)
}

fn prompt_password_twice() -> Result<String, Box<dyn Error + Send + Sync>> {
    let mut out = std::io::stderr();
    for _ in 0..3 {
        let p1 = prompt_password("Password: ")?;
        if p1.is_empty() {
            execute!(
                out,
                cursor::MoveToColumn(0),
                terminal::Clear(ClearType::CurrentLine),
                Print("Password must not be empty.\r\n")
            )?;
            continue;
        }

        let p2 = prompt_password("Confirm password: ")?;
        if p1 == p2 {
            return Ok(p1);
        }

        execute!(
            out,
            cursor::MoveToColumn(0),
            terminal::Clear(ClearType::CurrentLine),
            Print("Passwords do not match. Try again.\r\n")
        )?;
    }

    Err("too many attempts".into())
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();

    let db = connect_db(&cli.database_url).await?;
    let engine = Engine::builder().database(db).build().await?;

    match cli.command {
        Command::User(User {
            command: UserCommand::Create(args),
        }) => {
            let password = prompt_password_twice()?;
            exit_on_error(
                engine
                    .create_user(&args.username, &password, args.display_name.as_deref())
                    .await,
                1,
            );
            println!("created user: {}", args.username);
        }
        Command::User(User {
            command: UserCommand::LinkPayment(args),
        }) => {
            exit_on_error(
                engine
                    .link_payment_method(&args.username, &args.customer_ref)
                    .await,
                1,
            );
            println!("linked payment method for {}", args.username);
        }
        Command::Group(Group {
            command: GroupCommand::Create(args),
        }) => {
            let kind = exit_on_error(GroupKind::try_from(args.kind.as_str()), 2);
            let mut cmd = CreateGroupCmd::new(&args.name, &args.owner).kind(kind);
            if let Some(pct) = args.threshold {
                cmd = cmd.vote_threshold_pct(pct);
            }
            let group_id = exit_on_error(engine.create_group(cmd).await, 1);
            println!("created group: {} ({group_id})", args.name);
        }
        Command::Group(Group {
            command: GroupCommand::AddMember(args),
        }) => {
            let role = exit_on_error(MemberRole::try_from(args.role.as_str()), 2);
            exit_on_error(
                engine
                    .invite_member(&args.group, &args.username, role, &args.actor)
                    .await,
                1,
            );
            exit_on_error(engine.accept_invite(&args.group, &args.username).await, 1);
            println!("added {} to {}", args.username, args.group);
        }
    }

    Ok(())
}
