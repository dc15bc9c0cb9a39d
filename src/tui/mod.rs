pub mod app;
pub mod event;
pub mod layout;

use std::io::{self, Stdout};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{info, warn};

use crate::app::{AppContext, Result};
use crate::config::Config;
use crate::containers::{ContainersLayout, NavigationState};
use crate::prefs::SORT_ORDER;
use crate::service::{
    spawn_auto_refresh, spawn_service, ServiceAction, ServiceHandle, Target, TcpProbe,
};
use crate::session::Session;
use crate::store::SqliteStore;

use self::app::{Shared, TuiApp};
use self::event::{AppEvent, EventHandler};

type Tui = Terminal<CrosstermBackend<Stdout>>;

const TICK_RATE: Duration = Duration::from_millis(50);

pub async fn run(ctx: Arc<AppContext>, config: Arc<Config>, workers: usize) -> Result<()> {
    let service = spawn_service(ctx.service_context(&config, workers)?);
    // Entries queued for extraction by earlier `update` runs.
    service.start(ServiceAction::MobilizeFeeds, Target::All);
    let auto_refresh = spawn_auto_refresh(ctx.prefs.clone(), service.clone());

    let mut terminal = setup_terminal()?;
    let result = run_app(&mut terminal, &ctx, &config, service.clone()).await;
    restore_terminal(&mut terminal)?;

    service.stop().await;
    auto_refresh.abort();
    result
}

fn setup_terminal() -> Result<Tui> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Tui) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn build_app(
    ctx: &AppContext,
    config: &Config,
    service: ServiceHandle,
    session: Option<&Session>,
    width: u16,
) -> Result<TuiApp<SqliteStore>> {
    let now = Instant::now();
    let two_columns = config.layout.two_columns(width);
    let sort_desc = ctx.prefs.get_bool(SORT_ORDER);

    let (view_state, navigation) = match session {
        Some(session) => (session.view_state(sort_desc), session.navigation(two_columns)),
        None => (Default::default(), NavigationState::fallback(two_columns)),
    };
    // Details come back only once the entry is loaded again.
    let start_state = if navigation.has_details() {
        NavigationState::fallback(two_columns)
    } else {
        navigation
    };
    let layout = ContainersLayout::new(start_state, two_columns, config.layout.master_width, now);

    let shared = Shared {
        store: ctx.store.clone(),
        prefs: ctx.prefs.clone(),
        notifications: ctx.notifications.clone(),
        service,
        connectivity: Arc::new(TcpProbe::new(&config.network)),
    };
    let mut app = TuiApp::new(shared, view_state, config.list.page_size, layout)?;
    if let Some(session) = session {
        app.restore_session(session, now);
        app.layout.finish();
    }
    Ok(app)
}

async fn run_app(
    terminal: &mut Tui,
    ctx: &AppContext,
    config: &Config,
    service: ServiceHandle,
) -> Result<()> {
    let session_path = ctx.session_path();
    let session = session_path.as_deref().and_then(Session::load);
    let width = terminal.size()?.width;

    let mut tui_app = build_app(ctx, config, service, session.as_ref(), width)?;
    let event_handler = EventHandler::new(TICK_RATE);
    info!("TUI started ({} columns)", width);

    loop {
        terminal.draw(|frame| layout::render(frame, &mut tui_app, config))?;

        let now = Instant::now();
        match event_handler.next()? {
            AppEvent::Key(key) => {
                if let Err(e) = tui_app.handle_key(key, &config.keybindings, now).await {
                    warn!("Action failed: {}", e);
                    tui_app.set_status(e.to_string(), now);
                }
            }
            AppEvent::Resize(width, _) => {
                tui_app
                    .layout
                    .set_two_columns(config.layout.two_columns(width), now);
            }
            AppEvent::Tick => {}
        }

        tui_app.poll_background(Instant::now())?;

        if tui_app.should_quit {
            break;
        }
    }

    if let Some(path) = session_path {
        if let Err(e) = tui_app.session().save(&path) {
            warn!("Could not save session: {}", e);
        }
    }
    Ok(())
}
