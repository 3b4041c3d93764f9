use serde_json::{Value, json};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::tempdir;
use trellis::core::descriptor::{ArgumentSpec, CommandPath, Descriptor, OptionSpec};
use trellis::core::error::TrellisError;
use trellis::core::loader::{
    CommandLoader, CommandModule, Importer, ManifestImporter, Registry, RegistryEntry,
};
use trellis::core::options::Options;
use trellis::core::router::{Route, Router};
use trellis::core::unit::{CommandContext, CommandUnit, factory};
use trellis::plugins;

type Sink = Rc<RefCell<Vec<Value>>>;

/// Records the options object of every run.
struct Capture {
    sink: Sink,
}

impl CommandUnit for Capture {
    fn run(&mut self, _ctx: &CommandContext<'_>, options: &Options) -> anyhow::Result<()> {
        self.sink.borrow_mut().push(options.clone().into_value());
        Ok(())
    }
}

struct Failing;

impl CommandUnit for Failing {
    fn run(&mut self, _ctx: &CommandContext<'_>, _options: &Options) -> anyhow::Result<()> {
        anyhow::bail!("deploy target unreachable")
    }
}

fn capture_entry(path: &str, descriptor: Descriptor, sink: &Sink) -> RegistryEntry {
    let sink = sink.clone();
    RegistryEntry::new(
        CommandPath::parse(path),
        descriptor,
        factory(move || Capture { sink: sink.clone() }),
    )
}

fn deploy_descriptor() -> Descriptor {
    Descriptor::new()
        .with_description("Deploy the site")
        .with_arg(ArgumentSpec::required("target").with_description("Environment name"))
        .with_option(OptionSpec::parse("--force").unwrap().with_description("Skip checks"))
}

fn module_add_descriptor() -> Descriptor {
    Descriptor::new()
        .with_description("Add a module")
        .with_arg(ArgumentSpec::required("url"))
        .with_arg(ArgumentSpec::optional("name"))
}

fn router(sink: &Sink, cwd: &Path) -> Router {
    let registry = Registry::new(vec![
        capture_entry("deploy", deploy_descriptor(), sink),
        capture_entry("module add", module_add_descriptor(), sink),
        capture_entry(
            "module list",
            Descriptor::new().with_description("List modules"),
            sink,
        ),
        capture_entry(
            "build",
            Descriptor::new()
                .with_arg(ArgumentSpec::optional("entry"))
                .with_option(
                    OptionSpec::parse("-o, --out <dir>")
                        .unwrap()
                        .with_default(json!("dist")),
                ),
            sink,
        ),
    ]);
    Router::new("trellis", "0.0.0", registry).with_cwd(cwd.to_path_buf())
}

struct Outcome {
    code: i32,
    out: String,
    err: String,
}

fn dispatch(router: &Router, args: &[&str]) -> Outcome {
    colored::control::set_override(false);
    let mut argv = vec!["trellis"];
    argv.extend_from_slice(args);
    let mut out = Vec::new();
    let mut err = Vec::new();
    let code = router.dispatch(&argv, &mut out, &mut err);
    Outcome {
        code,
        out: String::from_utf8(out).unwrap(),
        err: String::from_utf8(err).unwrap(),
    }
}

#[test]
fn singleton_binds_positionals_options_and_globals() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    let outcome = dispatch(&router, &["deploy", "staging", "--force"]);
    assert_eq!(outcome.code, 0, "stderr: {}", outcome.err);
    assert_eq!(
        sink.borrow()[0],
        json!({"target": "staging", "force": true, "rootDir": null, "debug": null})
    );
}

#[test]
fn singleton_defaults_and_absent_positionals() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    assert_eq!(dispatch(&router, &["build"]).code, 0);
    assert_eq!(
        sink.borrow()[0],
        json!({"out": "dist", "rootDir": null, "debug": null})
    );

    assert_eq!(dispatch(&router, &["build", "src/main.ts", "-o", "public", "--debug"]).code, 0);
    assert_eq!(
        sink.borrow()[1],
        json!({"entry": "src/main.ts", "out": "public", "rootDir": null, "debug": true})
    );
}

#[test]
fn family_member_receives_forwarded_flags() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    let outcome = dispatch(
        &router,
        &["module", "add", "https://example.com/m.git", "--branch", "dev", "--root-dir", "/srv/site"],
    );
    assert_eq!(outcome.code, 0, "stderr: {}", outcome.err);
    assert_eq!(
        sink.borrow()[0],
        json!({
            "url": "https://example.com/m.git",
            "branch": "dev",
            "rootDir": "/srv/site",
            "debug": null
        })
    );
}

#[test]
fn positional_binding_wins_over_forwarded_option() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    assert_eq!(dispatch(&router, &["module", "add", "real-url", "--url", "flag-url"]).code, 0);
    assert_eq!(sink.borrow()[0]["url"], json!("real-url"));
}

#[test]
fn unknown_subcommand_is_reported_without_running() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    let outcome = dispatch(&router, &["module", "frobnicate"]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.err.contains("Unknown subcommand 'frobnicate' for 'module'"));
    assert!(sink.borrow().is_empty());
}

#[test]
fn family_without_subcommand_lists_members() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    let outcome = dispatch(&router, &["module"]);
    assert_eq!(outcome.code, 0);
    assert!(outcome.out.contains("Commands for module:"));
    assert!(outcome.out.contains("module add"));
    assert!(outcome.out.contains("module list"));
    assert!(!outcome.out.contains("deploy"));
}

#[test]
fn help_wins_over_missing_required_arguments() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    let outcome = dispatch(&router, &["deploy", "--help"]);
    assert_eq!(outcome.code, 0, "stderr: {}", outcome.err);
    assert!(outcome.out.contains("Usage: deploy <target>"));
    assert!(outcome.out.contains("--force"));
    assert!(outcome.out.contains("Skip checks"));

    let outcome = dispatch(&router, &["module", "add", "-h"]);
    assert_eq!(outcome.code, 0);
    assert!(outcome.out.contains("Usage: module add <url> [name]"));
    assert!(sink.borrow().is_empty());
}

#[test]
fn global_help_for_empty_invocation() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    for args in [&[][..], &["--help"][..]] {
        let outcome = dispatch(&router, args);
        assert_eq!(outcome.code, 0);
        assert!(outcome.out.contains("Usage: trellis <command> [options]"));
        assert!(outcome.out.contains("module add"));
        assert!(outcome.out.contains("--root-dir <path>"));
    }
}

#[test]
fn help_for_unknown_root_fails() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    let outcome = dispatch(&router, &["nope", "--help"]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.err.contains("Unknown command: nope"));
}

#[test]
fn parse_errors_exit_with_one() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    let outcome = dispatch(&router, &["deploy"]);
    assert_eq!(outcome.code, 1);
    assert!(!outcome.err.is_empty());

    let outcome = dispatch(&router, &["teleport"]);
    assert_eq!(outcome.code, 1);
    assert!(sink.borrow().is_empty());
}

#[test]
fn version_flag_prints_version() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    let outcome = dispatch(&router, &["--version"]);
    assert_eq!(outcome.code, 0);
    assert!(outcome.out.contains("0.0.0"));
}

#[test]
fn every_invocation_gets_a_fresh_unit() {
    struct Counting {
        runs: usize,
        seen: Rc<RefCell<Vec<usize>>>,
    }

    impl CommandUnit for Counting {
        fn run(&mut self, _ctx: &CommandContext<'_>, _options: &Options) -> anyhow::Result<()> {
            self.runs += 1;
            self.seen.borrow_mut().push(self.runs);
            Ok(())
        }
    }

    let tmp = tempdir().unwrap();
    let built = Rc::new(Cell::new(0usize));
    let seen = Rc::new(RefCell::new(Vec::new()));
    let (b, s) = (built.clone(), seen.clone());
    let entry = RegistryEntry::new(
        CommandPath::parse("tick"),
        Descriptor::new(),
        factory(move || {
            b.set(b.get() + 1);
            Counting {
                runs: 0,
                seen: s.clone(),
            }
        }),
    );
    let router = Router::new("trellis", "0.0.0", Registry::new(vec![entry])).with_cwd(tmp.path().to_path_buf());
    let before = built.get();

    assert_eq!(dispatch(&router, &["tick"]).code, 0);
    assert_eq!(dispatch(&router, &["tick"]).code, 0);
    assert_eq!(built.get() - before, 2);
    assert_eq!(*seen.borrow(), vec![1, 1]);
}

#[test]
fn failing_command_exits_with_one() {
    let tmp = tempdir().unwrap();
    let entry = RegistryEntry::new(CommandPath::parse("deploy"), Descriptor::new(), factory(|| Failing));
    let router = Router::new("trellis", "0.0.0", Registry::new(vec![entry])).with_cwd(tmp.path().to_path_buf());

    let outcome = dispatch(&router, &["deploy"]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.err.contains("deploy target unreachable"));
}

#[test]
fn project_required_without_project_fails() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let entry = capture_entry("build", Descriptor::new().requiring_project(), &sink);
    let router = Router::new("trellis", "0.0.0", Registry::new(vec![entry])).with_cwd(tmp.path().to_path_buf());

    let outcome = dispatch(&router, &["build"]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.err.contains("requires to be run within a Trellis project"));
    assert!(sink.borrow().is_empty());

    fs::write(tmp.path().join("trellis.toml"), "[project]\nname = \"site\"\n").unwrap();
    assert_eq!(dispatch(&router, &["build"]).code, 0);
    assert_eq!(sink.borrow().len(), 1);
}

#[test]
fn grouping_follows_registered_paths() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = router(&sink, tmp.path());

    assert!(matches!(router.routes().get("deploy"), Some(Route::Singleton { .. })));
    match router.routes().get("module") {
        Some(Route::Family { members, .. }) => {
            assert_eq!(members.keys().cloned().collect::<Vec<_>>(), ["add", "list"]);
        }
        other => panic!("expected module family, got {:?}", other),
    }
}

/// Fails on any file named `broken.toml`, returns an inert command otherwise.
struct FlakyImporter {
    sink: Sink,
}

impl Importer for FlakyImporter {
    fn import(&self, path: &Path) -> Result<CommandModule, TrellisError> {
        if path.file_name().and_then(|n| n.to_str()) == Some("broken.toml") {
            return Err(TrellisError::NotFound(path.display().to_string()));
        }
        let sink = self.sink.clone();
        Ok(CommandModule {
            descriptor: Descriptor::new(),
            factory: Some(factory(move || Capture { sink: sink.clone() })),
        })
    }
}

fn write_tree(root: &Path, files: &[&str]) {
    for file in files {
        let path: PathBuf = root.join(file);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();
    }
}

#[test]
fn loader_skips_failing_modules() {
    let tmp = tempdir().unwrap();
    write_tree(
        tmp.path(),
        &["init.toml", "broken.toml", "module/add.toml", "module/shared.d.toml", "index.toml", "notes.md"],
    );
    let loader = CommandLoader::new(FlakyImporter { sink: Sink::default() });
    let keys: Vec<String> = loader.load(tmp.path()).iter().map(|e| e.key()).collect();
    assert_eq!(keys, ["init", "module add"]);
}

#[test]
fn loader_on_missing_directory_is_empty() {
    let tmp = tempdir().unwrap();
    let loader = CommandLoader::new(FlakyImporter { sink: Sink::default() });
    assert!(loader.load(&tmp.path().join("absent")).is_empty());
}

#[test]
fn manifest_tree_dispatches_end_to_end() {
    let tmp = tempdir().unwrap();
    let commands = tmp.path().join("commands");
    fs::create_dir_all(commands.join("module")).unwrap();
    fs::write(
        commands.join("deploy.toml"),
        r#"
description = "Deploy the site"
handler = "inspect"

[[args]]
name = "target"
required = true

[[options]]
name = "--force"
"#,
    )
    .unwrap();
    fs::write(
        commands.join("module").join("add.toml"),
        "handler = \"inspect\"\n\n[[args]]\nname = \"url\"\nrequired = true\n",
    )
    .unwrap();
    fs::write(commands.join("broken.toml"), "handler = \"teleport\"\n").unwrap();

    let loader = CommandLoader::new(ManifestImporter::new(plugins::builtin_handlers()));
    let registry = Registry::new(loader.load(&commands));
    assert_eq!(registry.len(), 2);
    let router = Router::new("trellis", "0.0.0", registry).with_cwd(tmp.path().to_path_buf());

    let outcome = dispatch(&router, &["deploy", "staging", "--force"]);
    assert_eq!(outcome.code, 0, "stderr: {}", outcome.err);
    let printed: Value = serde_json::from_str(&outcome.out).unwrap();
    assert_eq!(
        printed,
        json!({"target": "staging", "force": true, "rootDir": null, "debug": null})
    );
}

#[test]
fn invalid_descriptors_are_dropped_from_registry() {
    let sink = Sink::default();
    let registry = Registry::new(vec![
        capture_entry(
            "bad",
            Descriptor::new()
                .with_arg(ArgumentSpec::optional("files..."))
                .with_arg(ArgumentSpec::required("out")),
            &sink,
        ),
        capture_entry("good", Descriptor::new(), &sink),
        capture_entry("good", Descriptor::new().with_description("shadowed"), &sink),
    ]);
    assert_eq!(registry.len(), 1);
    assert!(registry.contains("good"));
    assert_eq!(registry.get("good").unwrap().descriptor.description, None);
}

fn group_router(sink: &Sink, cwd: &Path) -> Router {
    let registry = Registry::new(vec![
        capture_entry(
            "group",
            Descriptor::new().with_description("Group root"),
            sink,
        ),
        capture_entry(
            "group add",
            Descriptor::new()
                .with_description("Add to the group")
                .with_arg(ArgumentSpec::required("url"))
                .with_arg(ArgumentSpec::optional("rest...")),
            sink,
        ),
    ]);
    Router::new("trellis", "0.0.0", registry).with_cwd(cwd.to_path_buf())
}

#[test]
fn family_root_registered_as_command_still_lists_members() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = group_router(&sink, tmp.path());

    for args in [&["group"][..], &["group", "--help"][..]] {
        let outcome = dispatch(&router, args);
        assert_eq!(outcome.code, 0, "stderr: {}", outcome.err);
        assert!(outcome.out.contains("Commands for group:"), "{:?}: {}", args, outcome.out);
        assert!(outcome.out.contains("group add"));
        assert!(outcome.out.contains("Group root"));
    }
    assert!(sink.borrow().is_empty());
}

#[test]
fn separator_after_subcommand_keeps_hyphen_values_positional() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = group_router(&sink, tmp.path());

    let outcome = dispatch(&router, &["group", "add", "--", "-x", "y"]);
    assert_eq!(outcome.code, 0, "stderr: {}", outcome.err);
    assert_eq!(
        sink.borrow()[0],
        json!({"url": "-x", "rest": ["y"], "rootDir": null, "debug": null})
    );
}

#[test]
fn unknown_flag_before_subcommand_is_forwarded() {
    let tmp = tempdir().unwrap();
    let sink = Sink::default();
    let router = group_router(&sink, tmp.path());

    let outcome = dispatch(&router, &["group", "--flag", "add", "u"]);
    assert_eq!(outcome.code, 0, "stderr: {}", outcome.err);
    assert_eq!(
        sink.borrow()[0],
        json!({"url": "u", "flag": true, "rootDir": null, "debug": null})
    );

    let outcome = dispatch(&router, &["--debug", "group", "--root-dir", "/srv", "add", "u"]);
    assert_eq!(outcome.code, 0, "stderr: {}", outcome.err);
    assert_eq!(
        sink.borrow()[1],
        json!({"url": "u", "rootDir": "/srv", "debug": true})
    );
}

/// Panics while building units for `panicky.toml`.
struct PanickyImporter;

impl Importer for PanickyImporter {
    fn import(&self, path: &Path) -> Result<CommandModule, TrellisError> {
        let panics = path.file_name().and_then(|n| n.to_str()) == Some("panicky.toml");
        let sink = Sink::default();
        Ok(CommandModule {
            descriptor: Descriptor::new(),
            factory: Some(factory(move || {
                if panics {
                    panic!("unit construction failed");
                }
                Capture { sink: sink.clone() }
            })),
        })
    }
}

#[test]
fn loader_skips_factories_that_panic() {
    let tmp = tempdir().unwrap();
    write_tree(tmp.path(), &["build.toml", "panicky.toml", "run.toml"]);
    let loader = CommandLoader::new(PanickyImporter);
    let keys: Vec<String> = loader.load(tmp.path()).iter().map(|e| e.key()).collect();
    assert_eq!(keys, ["build", "run"]);
}
