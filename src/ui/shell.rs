// ConsoleShell - single-threaded command loop standing in for the desktop window
//
// Each tick the loop pops at most one push notification, applies results of
// finished service calls, renders session changes, and handles at most one
// command line. Nothing in
// the loop waits on the network: service calls run on tokio via ShellBridge,
// stdin is read on its own thread, and notifications are pulled from the
// NotificationBridge's queue.

use crate::models::{ApiStatus, CrimeSummary, RouteSummary, WeatherForecast};
use crate::notifications::NotificationBridge;
use crate::services::{RoomFilter, RoomInfo, RoomListing, ServiceClient, ServiceError};
use crate::state::SessionChange;
use crate::ui::bridge::{PendingUpdates, ShellBridge};
use crate::ui::commands::{Command, HELP};
use std::future::Future;
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError as SessionRecvError};

/// Where the shell writes what the user sees
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send {
    /// A push notification from the broker
    fn notify(&mut self, message: &str);

    /// Command output
    fn show(&mut self, text: &str);

    fn error(&mut self, text: &str);
}

/// Prints to the terminal
#[derive(Debug, Default)]
pub struct StdoutSink;

impl NotificationSink for StdoutSink {
    fn notify(&mut self, message: &str) {
        println!("\n>> New update: {}", message);
    }

    fn show(&mut self, text: &str) {
        println!("{}", text);
    }

    fn error(&mut self, text: &str) {
        eprintln!("{}", text);
    }
}

/// State touched only on the shell thread
pub struct ShellView {
    sink: Box<dyn NotificationSink>,
    /// Names from the last successful `rooms`
    pub room_names: Vec<String>,
    /// Postcode of the last room viewed, the default for area lookups
    pub selected_postcode: Option<String>,
}

impl ShellView {
    pub fn new(sink: Box<dyn NotificationSink>) -> Self {
        Self {
            sink,
            room_names: Vec::new(),
            selected_postcode: None,
        }
    }

    pub fn notify(&mut self, message: &str) {
        self.sink.notify(message);
    }

    pub fn show(&mut self, text: &str) {
        self.sink.show(text);
    }

    pub fn error(&mut self, text: &str) {
        self.sink.error(text);
    }

    fn report<T>(&mut self, result: Result<T, ServiceError>, render: impl FnOnce(&mut Self, T)) {
        match result {
            Ok(value) => render(self, value),
            Err(e) => {
                tracing::debug!("Service call failed: {:?}", e);
                self.error(&e.to_string());
            }
        }
    }
}

/// Outcome of handling one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct ConsoleShell {
    notifications: NotificationBridge,
    client: ServiceClient,
    view: ShellView,
    bridge: ShellBridge<ShellView>,
    pending: PendingUpdates<ShellView>,
    session_rx: broadcast::Receiver<SessionChange>,
    poll_interval: Duration,
}

impl ConsoleShell {
    pub fn new(
        notifications: NotificationBridge,
        client: ServiceClient,
        sink: Box<dyn NotificationSink>,
        tokio_handle: tokio::runtime::Handle,
        poll_interval: Duration,
    ) -> Self {
        let (bridge, pending) = ShellBridge::new(tokio_handle);
        let session_rx = client.session().subscribe();
        Self {
            notifications,
            client,
            view: ShellView::new(sink),
            bridge,
            pending,
            session_rx,
            poll_interval,
        }
    }

    pub fn view(&self) -> &ShellView {
        &self.view
    }

    pub fn notifications(&self) -> &NotificationBridge {
        &self.notifications
    }

    /// One iteration of the poll timer: show at most one notification, apply
    /// finished service results and render session changes. Returns whether a
    /// notification was shown.
    pub fn tick(&mut self) -> bool {
        let shown = match self.notifications.drain_one() {
            Some(message) => {
                self.view.notify(&message);
                true
            }
            None => false,
        };

        self.pending.apply_pending(&mut self.view);
        self.render_session_changes();
        shown
    }

    fn render_session_changes(&mut self) {
        loop {
            match self.session_rx.try_recv() {
                Ok(change) => self.view.show(&describe(&change)),
                Err(SessionRecvError::Lagged(skipped)) => {
                    tracing::warn!("Shell missed {} session change(s)", skipped);
                }
                Err(SessionRecvError::Empty) | Err(SessionRecvError::Closed) => break,
            }
        }
    }

    /// Run until `quit`, end of input, or `shutdown` is raised.
    ///
    /// Always stops the notification bridge before returning.
    pub fn run(&mut self, commands: mpsc::Receiver<String>, shutdown: &AtomicBool) {
        tracing::info!("Shell started, polling every {:?}", self.poll_interval);
        self.prompt();

        while !shutdown.load(Ordering::SeqCst) {
            self.tick();

            match commands.try_recv() {
                Ok(line) => {
                    if self.handle_line(&line) == Flow::Quit {
                        break;
                    }
                    self.prompt();
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    tracing::info!("Input closed");
                    break;
                }
            }

            std::thread::sleep(self.poll_interval);
        }

        self.shutdown();
    }

    /// Stop push notifications. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.notifications.stop();
        tracing::info!("Shell stopped");
    }

    pub fn set_notifications(&mut self, enabled: bool) {
        if !enabled {
            self.notifications.stop();
            self.view.show("Push notifications off.");
            return;
        }

        match self.notifications.start() {
            Ok(()) => self.view.show("Push notifications on."),
            Err(e) => {
                tracing::warn!("Push notifications unavailable: {}", e);
                self.view
                    .error(&format!("Push notifications unavailable: {}", e));
            }
        }
    }

    pub fn handle_line(&mut self, line: &str) -> Flow {
        match Command::parse(line) {
            Ok(Some(command)) => self.dispatch(command),
            Ok(None) => Flow::Continue,
            Err(usage) => {
                self.view.error(&usage);
                Flow::Continue
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> Flow {
        tracing::debug!("Command: {:?}", Redacted(&command));

        match command {
            Command::Help => self.view.show(HELP),
            Command::Quit => return Flow::Quit,
            Command::Notify(enabled) => self.set_notifications(enabled),
            Command::Logout => {
                if self.client.session().logout().is_empty() {
                    self.view.show("Not logged in.");
                }
            }
            Command::Server(name) => self.switch_server(name),
            Command::Login { username, password } => self.spawn(
                move |client| async move { client.login(&username, &password).await },
                |view, status: ApiStatus| view.show(&status.message),
            ),
            Command::Register {
                username,
                password,
                confirm,
            } => self.spawn(
                move |client| async move { client.register(&username, &password, &confirm).await },
                |view, status: ApiStatus| {
                    view.show(&format!("User registered successfully: {}", status.message))
                },
            ),
            Command::Rooms(filter) => self.list_rooms(filter),
            Command::Room(name) => self.spawn(
                move |client| async move { client.fetch_room_details(&name).await },
                |view, info: RoomInfo| {
                    view.selected_postcode = Some(info.postcode);
                    view.show(&info.text);
                },
            ),
            Command::Apply {
                dorm,
                applicant,
                password,
            } => self.spawn(
                move |client| async move { client.apply_for_room(&dorm, &applicant, &password).await },
                |view, text: String| view.show(&text),
            ),
            Command::Cancel {
                dorm,
                applicant,
                password,
            } => self.spawn(
                move |client| async move {
                    client.cancel_application(&dorm, &applicant, &password).await
                },
                |view, text: String| view.show(&text),
            ),
            Command::History(dorm) => self.spawn(
                move |client| async move { client.view_history(&dorm).await },
                |view, text: String| view.show(text.trim_end()),
            ),
            Command::Weather(postcode) => {
                if let Some(postcode) = self.postcode_or_selected(postcode) {
                    self.spawn(
                        move |client| async move { client.fetch_weather(&postcode).await },
                        |view, forecast: WeatherForecast| view.show(&forecast.to_string()),
                    );
                }
            }
            Command::Crime(postcode) => {
                if let Some(postcode) = self.postcode_or_selected(postcode) {
                    self.spawn(
                        move |client| async move { client.fetch_crime(&postcode).await },
                        |view, summary: CrimeSummary| view.show(&summary.to_string()),
                    );
                }
            }
            Command::Route { from, to } => {
                if let Some(to) = self.postcode_or_selected(to) {
                    self.spawn(
                        move |client| async move { client.fetch_route_distance(&from, &to).await },
                        |view, route: RouteSummary| view.show(&route.message),
                    );
                }
            }
        }

        Flow::Continue
    }

    fn switch_server(&mut self, name: Option<String>) {
        let session = self.client.session();
        let result = match name {
            Some(name) => session.switch_server(&name),
            None => Ok(session.next_server()),
        };

        match result {
            Ok(changes) if changes.is_empty() => {
                let (name, address) = session.current_server();
                self.view.show(&format!("Already on {} ({})", name, address));
            }
            Ok(_) => {}
            Err(e) => {
                let known = session.server_names().join(", ");
                self.view.error(&format!("{}. Known servers: {}", e, known));
            }
        }
    }

    fn list_rooms(&mut self, filter: RoomFilter) {
        self.spawn(
            move |client| async move { client.list_room_names(&filter).await },
            |view, listing: RoomListing| {
                view.room_names = listing.names;
                let mut text = listing.message;
                for name in &view.room_names {
                    text.push_str("\n  ");
                    text.push_str(name);
                }
                view.show(&text);
            },
        );
    }

    fn postcode_or_selected(&mut self, postcode: Option<String>) -> Option<String> {
        let postcode = postcode.or_else(|| self.view.selected_postcode.clone());
        if postcode.is_none() {
            self.view
                .error("No postcode given and no room selected. Use 'room <name>' first.");
        }
        postcode
    }

    /// Run a service call on tokio and render its result on a later tick.
    fn spawn<T, Call, Fut, Render>(&self, call: Call, render: Render)
    where
        T: Send + 'static,
        Call: FnOnce(ServiceClient) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ServiceError>> + Send + 'static,
        Render: FnOnce(&mut ShellView, T) + Send + 'static,
    {
        let client = self.client.clone();
        let ui = self.bridge.clone();
        self.bridge.spawn_async(move || async move {
            let result = call(client).await;
            ui.update_shell(move |view| view.report(result, render));
        });
    }

    fn prompt(&self) {
        let user = self
            .client
            .session()
            .current_user()
            .map(|u| format!("@{}", u))
            .unwrap_or_default();
        let (server, _) = self.client.session().current_server();
        print!("globaldorm[{}]{}> ", server, user);
        let _ = std::io::stdout().flush();
    }
}

fn describe(change: &SessionChange) -> String {
    match change {
        SessionChange::LoggedIn { username } => format!("Logged in as {}.", username),
        SessionChange::LoggedOut => "Logged out.".to_string(),
        SessionChange::ServerChanged { name, address } => format!("Server: {} ({})", name, address),
    }
}

// Keeps passwords out of debug logs
struct Redacted<'a>(&'a Command);

impl std::fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Command::Login { username, .. } => write!(f, "Login {{ username: {:?} }}", username),
            Command::Register { username, .. } => {
                write!(f, "Register {{ username: {:?} }}", username)
            }
            Command::Apply { dorm, applicant, .. } => {
                write!(f, "Apply {{ dorm: {:?}, applicant: {:?} }}", dorm, applicant)
            }
            Command::Cancel { dorm, applicant, .. } => {
                write!(f, "Cancel {{ dorm: {:?}, applicant: {:?} }}", dorm, applicant)
            }
            other => write!(f, "{:?}", other),
        }
    }
}

/// Read stdin lines on a background thread so the shell loop never blocks on input.
///
/// The channel disconnects at end of input.
pub fn spawn_stdin_reader() -> std::io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read input: {}", e);
                        break;
                    }
                }
            }
            tracing::debug!("stdin reader thread terminated");
        })?;
    Ok(rx)
}
