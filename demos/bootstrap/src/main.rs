//! Wires a small application graph by hand: a root scope with shared
//! services, a session child scope, a command pool and an event dispatcher.

use std::cell::Cell;
use std::rc::Rc;

use armature_commands::{Command, Commands, Control, NamedDispatcher};
use armature_core::{Descriptor, Injected, Provide, Scope, ScopeSettings, Slot};

trait Clock {
    fn now(&self) -> u64;
}

struct FixedClock;

impl Injected for FixedClock {
    fn construct() -> Self {
        FixedClock
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        1_700_000_000
    }
}

impl Provide<dyn Clock> for FixedClock {
    fn provide(this: Rc<Self>) -> Rc<dyn Clock> {
        this
    }
}

/// Connects somewhere slow; signals readiness through `init_done` below.
struct Database {
    connected: Cell<bool>,
}

impl Injected for Database {
    fn construct() -> Self {
        Database {
            connected: Cell::new(false),
        }
    }

    fn descriptor() -> Descriptor<Self> {
        Descriptor::new()
            .init_async()
            .cleanup("disconnect", |db: &Database| {
                db.connected.set(false);
                tracing::info!("database disconnected");
            })
    }
}

struct Session {
    clock: Slot<dyn Clock>,
    database: Slot<Database>,
}

impl Injected for Session {
    fn construct() -> Self {
        Session {
            clock: Slot::empty(),
            database: Slot::empty(),
        }
    }

    fn descriptor() -> Descriptor<Self> {
        Descriptor::new()
            .inject("clock", |s: &Session| &s.clock)
            .inject_waiting("database", |s: &Session| &s.database)
            .post_init("ready", |s: &Session| {
                tracing::info!(now = s.clock.get().now(), "session ready");
            })
    }
}

struct SaveCommand {
    database: Slot<Database>,
}

impl Injected for SaveCommand {
    fn construct() -> Self {
        SaveCommand {
            database: Slot::empty(),
        }
    }

    fn descriptor() -> Descriptor<Self> {
        Descriptor::new().inject("database", |c: &SaveCommand| &c.database)
    }
}

impl Command for SaveCommand {
    type Param = ();

    fn run(&self, _ctl: &Control, _param: ()) {
        let connected = self.database.get().connected.get();
        tracing::info!(connected, "saving");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let root = Scope::new(ScopeSettings::default());
    root.register_as::<dyn Clock, FixedClock>().unwrap();
    root.register::<Database>().unwrap();

    let session_scope = root.child();
    session_scope.register::<Session>().unwrap();

    // post-init waits for the database
    let session = session_scope.get::<Session>().unwrap();

    let database = session.database.get();
    database.connected.set(true);
    session_scope.init_done(&database).unwrap();

    let commands = Commands::new(&session_scope);
    let dispatcher = NamedDispatcher::new(commands.clone());
    dispatcher.register_event::<SaveCommand>("save");

    dispatcher.execute("save").unwrap();
    commands.execute::<SaveCommand>(()).unwrap();

    root.clean_up();
    tracing::info!("done");
}
