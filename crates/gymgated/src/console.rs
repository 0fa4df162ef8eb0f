//! Line-oriented operator console: reads commands from stdin and prints
//! each screen's state as it changes.

use crate::poller::{AccessPhase, AccessSnapshot};
use crate::registration::RegistrationForm;
use crate::router::{DirectoryState, View, ViewRouter};
use chrono::NaiveDate;
use gymgate_core::{ClientDirectory, RecognitionService};
use gymgate_hw::CaptureSource;
use tokio::io::{AsyncBufReadExt, BufReader};

const HELP: &str = "\
commands:
  access | clients | register   switch screen
  refresh                       reload the client list
  scan                          access: check the camera now
  status                        reprint the current screen
  name <text>                   registration: full name
  email <text>                  registration: email
  expires <YYYY-MM-DD>          registration: membership expiration
  photo | retake                registration: take or discard the photo
  submit                        registration: create the client
  help | quit";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Show(View),
    Refresh,
    Scan,
    Status,
    Name(String),
    Email(String),
    Expires(String),
    Photo,
    Retake,
    Submit,
    Help,
    Quit,
}

/// Parse a console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_ascii_lowercase().as_str() {
        "access" => Command::Show(View::Access),
        "clients" => Command::Show(View::Clients),
        "register" => Command::Show(View::Register),
        "refresh" => Command::Refresh,
        "scan" => Command::Scan,
        "status" => Command::Status,
        "name" => Command::Name(rest.to_string()),
        "email" => Command::Email(rest.to_string()),
        "expires" => Command::Expires(rest.to_string()),
        "photo" => Command::Photo,
        "retake" => Command::Retake,
        "submit" => Command::Submit,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command {other:?}; type `help`")),
    };
    Ok(Some(command))
}

/// Render the access screen.
pub fn render_access(snapshot: &AccessSnapshot) -> String {
    let mut out = String::from(match snapshot.phase {
        AccessPhase::Idle => "[access] scanning every few seconds...",
        AccessPhase::Granted => "[access] ACCESS GRANTED",
        AccessPhase::Denied => "[access] ACCESS DENIED",
    });

    if let Some(outcome) = &snapshot.outcome {
        out.push_str(&format!("\n  {}", outcome.message));
        if let Some(client) = &outcome.client {
            out.push_str(&format!("\n  client: {}", client.name));
            if let Some(confidence) = outcome.confidence {
                out.push_str(&format!("\n  confidence: {confidence:.0}%"));
            }
        }
    }
    if let Some(error) = &snapshot.cycle.last_error {
        out.push_str(&format!("\n  ! {error}"));
    }
    out
}

/// Render the clients screen; memberships that ended before `today` are flagged.
pub fn render_directory(state: &DirectoryState, today: NaiveDate) -> String {
    let mut out = String::from("[clients]");
    if state.loading {
        out.push_str(" loading...");
    }
    if let Some(error) = &state.last_error {
        out.push_str(&format!("\n  ! {error}"));
    }
    if state.clients.is_empty() && !state.loading {
        out.push_str("\n  no clients registered");
    }
    for client in &state.clients {
        let status = if client.active { "active" } else { "inactive" };
        let face = if client.has_face { "face enrolled" } else { "no face" };
        let expired = if client.membership_expired(today) {
            " (expired)"
        } else {
            ""
        };
        out.push_str(&format!(
            "\n  #{:<4} {:<24} {:<28} {status:<8} expires {}{expired}  {face}",
            client.id, client.name, client.email, client.expiration_date
        ));
    }
    out
}

/// Render the registration screen.
pub fn render_registration(form: &RegistrationForm, has_photo: bool) -> String {
    let field = |value: &str| {
        if value.trim().is_empty() {
            "-".to_string()
        } else {
            value.trim().to_string()
        }
    };
    format!(
        "[register]\n  name: {}\n  email: {}\n  expires: {}\n  photo: {}",
        field(&form.name),
        field(&form.email),
        field(&form.expiration_date),
        if has_photo { "captured" } else { "none" }
    )
}

fn render_current<A, C>(router: &ViewRouter<A, C>) -> String
where
    A: RecognitionService + ClientDirectory,
    C: CaptureSource,
{
    match router.view() {
        View::Access => {
            let mut text = render_access(&router.poller().snapshot());
            if !router.poller().is_running() {
                text.push_str("\n  (poller stopped)");
            }
            text
        }
        View::Clients => render_directory(&router.directory(), chrono::Local::now().date_naive()),
        View::Register => {
            let flow = router.registration();
            render_registration(flow.form(), flow.has_photo())
        }
    }
}

/// Access snapshot with the in-flight flag masked, so a scan in progress
/// does not reprint an unchanged screen.
fn visible(snapshot: &AccessSnapshot) -> AccessSnapshot {
    let mut shown = snapshot.clone();
    shown.cycle.in_flight = false;
    shown
}

enum Flow {
    Continue,
    Quit,
}

async fn handle<A, C>(router: &mut ViewRouter<A, C>, command: Command) -> Flow
where
    A: RecognitionService + ClientDirectory,
    C: CaptureSource,
{
    let in_register = router.view() == View::Register;
    match command {
        Command::Show(view) => router.switch(view),
        Command::Refresh => router.reload_directory(),
        Command::Status => println!("{}", render_current(router)),
        Command::Scan if router.view() != View::Access => {
            println!("switch to the access screen first (`access`)");
        }
        Command::Scan => {
            if !router.poller().tick() {
                println!("[access] a check is already in progress");
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return Flow::Quit,
        Command::Name(_)
        | Command::Email(_)
        | Command::Expires(_)
        | Command::Photo
        | Command::Retake
        | Command::Submit
            if !in_register =>
        {
            println!("switch to the register screen first (`register`)");
        }
        Command::Name(name) => router.registration_mut().form_mut().name = name,
        Command::Email(email) => router.registration_mut().form_mut().email = email,
        Command::Expires(date) => router.registration_mut().form_mut().expiration_date = date,
        Command::Photo => match router.registration_mut().capture().await {
            Ok(()) => println!("[register] photo captured"),
            Err(e) => println!("[register] ! {e}"),
        },
        Command::Retake => {
            router.registration_mut().retake();
            println!("[register] photo discarded");
        }
        Command::Submit => match router.submit_registration().await {
            Ok(client) => println!("[register] client #{} registered with face", client.id),
            Err(e) => println!("[register] ! {e}"),
        },
    }
    Flow::Continue
}

/// Drive the kiosk until stdin closes, `quit`, or Ctrl-C.
pub async fn run<A, C>(mut router: ViewRouter<A, C>) -> anyhow::Result<()>
where
    A: RecognitionService + ClientDirectory,
    C: CaptureSource,
{
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut access = router.poller().subscribe();
    let mut directory = router.subscribe_directory();
    let mut last_access = visible(&access.borrow_and_update());

    println!("{HELP}");
    println!("[{}]", router.view());

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(Some(command)) => {
                        if let Flow::Quit = handle(&mut router, command).await {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(msg) => println!("{msg}"),
                }
            }
            Ok(()) = access.changed() => {
                let shown = visible(&access.borrow_and_update());
                if shown != last_access {
                    if router.view() == View::Access {
                        println!("{}", render_access(&shown));
                    }
                    last_access = shown;
                }
            }
            Ok(()) = directory.changed() => {
                let state = directory.borrow_and_update().clone();
                if router.view() == View::Clients {
                    println!("{}", render_directory(&state, chrono::Local::now().date_naive()));
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    router.shutdown();
    Ok(())
}
