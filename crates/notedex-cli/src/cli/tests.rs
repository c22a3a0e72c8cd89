use super::*;
use clap::Parser;

#[test]
fn root_defaults_to_dot_notedex() {
    let cli = Cli::try_parse_from(["notedex", "tags"]).expect("parse");
    assert_eq!(cli.root, PathBuf::from(".notedex"));
    assert!(matches!(cli.command, Commands::Tags));
}

#[test]
fn import_collects_repeated_excludes() {
    let cli = Cli::try_parse_from([
        "notedex",
        "import",
        "vault",
        "--collection",
        "3",
        "--exclude",
        "drafts/**",
        "--exclude",
        "*.tmp.md",
        "--include-hidden",
    ])
    .expect("parse");
    match cli.command {
        Commands::Import(args) => {
            assert_eq!(args.dir, PathBuf::from("vault"));
            assert_eq!(args.collection, Some(3));
            assert_eq!(args.exclude, vec!["drafts/**", "*.tmp.md"]);
            assert!(args.include_hidden);
        }
        _ => panic!("expected import command"),
    }
}

#[test]
fn collection_update_requires_name() {
    let parsed = Cli::try_parse_from(["notedex", "collection", "update", "4"]);
    assert!(parsed.is_err(), "update without --name must be rejected");
}

#[test]
fn collection_update_rejects_parent_with_top_level() {
    let parsed = Cli::try_parse_from([
        "notedex",
        "collection",
        "update",
        "4",
        "--name",
        "x",
        "--parent",
        "2",
        "--top-level",
    ]);
    assert!(parsed.is_err());
}

#[test]
fn collection_create_accepts_negative_position() {
    let cli = Cli::try_parse_from([
        "notedex",
        "collection",
        "create",
        "Archive",
        "--position",
        "-1",
    ])
    .expect("parse");
    match cli.command {
        Commands::Collection(CollectionArgs {
            command:
                CollectionCommand::Create {
                    name,
                    parent,
                    position,
                    ..
                },
        }) => {
            assert_eq!(name, "Archive");
            assert_eq!(parent, None);
            assert_eq!(position, -1);
        }
        _ => panic!("expected collection create command"),
    }
}

#[test]
fn ids_must_be_positive() {
    assert!(Cli::try_parse_from(["notedex", "note", "get", "0"]).is_err());
    assert!(Cli::try_parse_from(["notedex", "note", "get", "abc"]).is_err());
}

#[test]
fn search_page_size_must_be_at_least_one() {
    let parsed = Cli::try_parse_from(["notedex", "search", "rust", "--page-size", "0"]);
    assert!(parsed.is_err());
}

#[test]
fn search_accepts_hyphen_leading_query() {
    let cli = Cli::try_parse_from(["notedex", "search", "-weird", "--snippets"]).expect("parse");
    match cli.command {
        Commands::Search(args) => {
            assert_eq!(args.query, "-weird");
            assert!(args.snippets);
            assert_eq!(args.page_size, None);
        }
        _ => panic!("expected search command"),
    }
}

#[test]
fn operation_names_follow_subcommands() {
    let cli = Cli::try_parse_from(["notedex", "collection", "rm", "2"]).expect("parse");
    assert_eq!(cli.command.operation(), "collection.delete");
    let cli = Cli::try_parse_from(["notedex", "index", "check"]).expect("parse");
    assert_eq!(cli.command.operation(), "title_index.check");
}
