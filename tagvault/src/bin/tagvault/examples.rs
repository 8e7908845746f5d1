use crate::commands::{check, clear_cache, fix_orphans, init, populate, reconcile};

#[derive(Clone, Copy)]
pub struct ExampleGroup {
    pub title: &'static str,
    pub commands: &'static [&'static str],
}

#[derive(Clone, Copy)]
pub struct CommandExample {
    pub name: &'static str,
    pub groups: &'static [ExampleGroup],
}

pub fn command_examples() -> &'static [CommandExample] {
    &[
        CommandExample {
            name: "init",
            groups: init::EXAMPLES,
        },
        CommandExample {
            name: "populate",
            groups: populate::EXAMPLES,
        },
        CommandExample {
            name: "reconcile",
            groups: reconcile::EXAMPLES,
        },
        CommandExample {
            name: "check",
            groups: check::EXAMPLES,
        },
        CommandExample {
            name: "fix-orphans",
            groups: fix_orphans::EXAMPLES,
        },
        CommandExample {
            name: "clear-cache",
            groups: clear_cache::EXAMPLES,
        },
    ]
}
