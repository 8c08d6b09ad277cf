use super::*;
use clap::CommandFactory;

#[test]
fn parse_field_splits_on_first_equals() {
    assert_eq!(parse_field("title=a=b").unwrap(), ("title", "a=b"));
    assert_eq!(parse_field(" note =").unwrap(), ("note", ""));
}

#[test]
fn parse_field_rejects_missing_name() {
    assert!(matches!(parse_field("=x"), Err(CliError::InvalidField(_))));
    assert!(matches!(parse_field("novalue"), Err(CliError::InvalidField(_))));
}

#[test]
fn shell_lines_parse() {
    assert_eq!(parse_shell_line("go /tasks/42").unwrap(), Some(ShellCommand::Go("/tasks/42".to_owned())));
    assert_eq!(parse_shell_line("  login   Ann Lee ").unwrap(), Some(ShellCommand::Login("Ann Lee".to_owned())));
    assert_eq!(parse_shell_line("exit").unwrap(), Some(ShellCommand::Quit));
    assert_eq!(parse_shell_line("   ").unwrap(), None);
    assert_eq!(parse_shell_line("# comment").unwrap(), None);
}

#[test]
fn shell_rejects_unknown_and_bare_commands() {
    assert!(matches!(parse_shell_line("dance"), Err(CliError::UnknownCommand(w)) if w == "dance"));
    assert!(matches!(parse_shell_line("get"), Err(CliError::MissingArgument("get"))));
}

#[test]
fn cli_parses_upload_fields() {
    let cli = Cli::try_parse_from([
        "luxlist", "upload", "/tasks/1/attachments", "--file", "notes.txt", "--field", "title=x", "--field", "a=b",
    ])
    .unwrap();
    match cli.command {
        Command::Upload { path, file, fields } => {
            assert_eq!(path, "/tasks/1/attachments");
            assert_eq!(file, PathBuf::from("notes.txt"));
            assert_eq!(fields, vec!["title=x".to_owned(), "a=b".to_owned()]);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn api_url_flag_replaces_env_lookup() {
    let config = load_config(Some("http://example.test/api/v1/")).unwrap();
    assert_eq!(config.api_url, "http://example.test/api/v1");
}

#[test]
fn invalid_api_url_flag_is_reported() {
    assert!(matches!(load_config(Some("not a url")), Err(CliError::Config(_))));
}

#[test]
fn flags_fall_back_to_env_names() {
    let command = Cli::command();
    let env_of = |id: &str| {
        command
            .get_arguments()
            .find(|arg| arg.get_id() == id)
            .and_then(|arg| arg.get_env())
            .map(|env| env.to_string_lossy().into_owned())
    };
    assert_eq!(env_of("api_url").as_deref(), Some("LUXLIST_API_URL"));
    assert_eq!(env_of("state_dir").as_deref(), Some("LUXLIST_STATE_DIR"));
}
