#[cfg(test)]
mod tests {
    use crate::cli::Args;
    use crate::config::LLMProvider;
    use crate::generator::workflow::{Command, RunOptions};
    use clap::Parser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// 指向一个空配置文件，避免读到工作目录下的 storm.toml
    fn parse(extra: &[&str]) -> (Args, TempDir) {
        let dir = TempDir::new().unwrap();
        let config_path = dir.path().join("storm.toml");
        std::fs::write(&config_path, "").unwrap();

        let mut argv = vec!["investor-storm", "--config", config_path.to_str().unwrap()];
        argv.extend_from_slice(extra);
        (Args::try_parse_from(argv).unwrap(), dir)
    }

    #[test]
    fn test_args_default_values() {
        let args = Args::try_parse_from(["investor-storm"]).unwrap();

        assert_eq!(args.name, None);
        assert!(!args.list);
        assert!(!args.delete);
        assert!(!args.skip_research);
        assert!(!args.skip_outline);
        assert!(!args.skip_article);
        assert!(!args.skip_polish);
        assert!(!args.remove_duplicate);
        assert!(!args.verbose);
        assert!(!args.no_cache);
    }

    #[test]
    fn test_args_short_options() {
        let args =
            Args::try_parse_from(["investor-storm", "-n", "Acme Corp", "-c", "/tmp/s.toml", "-v"])
                .unwrap();

        assert_eq!(args.name, Some("Acme Corp".to_string()));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/s.toml")));
        assert!(args.verbose);
    }

    #[test]
    fn test_list_conflicts_with_delete() {
        assert!(Args::try_parse_from(["investor-storm", "--list", "--delete"]).is_err());
    }

    #[test]
    fn test_overrides_are_applied() {
        let (args, _dir) = parse(&[
            "--llm-provider",
            "deepseek",
            "--llm-api-key",
            "sk-test",
            "--model",
            "deepseek-chat",
            "--temperature",
            "0.2",
            "--max-thread-num",
            "4",
            "--max-perspective",
            "2",
            "--retrieve-top-k",
            "7",
            "--disable-perspective",
            "--storage-dir",
            "/tmp/records",
            "--no-cache",
        ]);
        let config = args.to_config().unwrap();

        assert_eq!(config.llm.provider, LLMProvider::DeepSeek);
        assert_eq!(config.llm.api_key, "sk-test");
        assert_eq!(config.llm.temperature, 0.2);
        assert_eq!(config.runner.max_thread_num, 4);
        assert_eq!(config.runner.max_perspective, 2);
        assert_eq!(config.runner.retrieve_top_k, 7);
        assert!(config.runner.disable_perspective);
        assert_eq!(config.storage.dir, PathBuf::from("/tmp/records"));
        assert!(!config.cache.enabled);

        let article_gen = config.models.article_gen.unwrap();
        assert_eq!(article_gen.name, "deepseek-chat");
        // 只替换模型名，保留各角色的 token 上限
        assert_eq!(article_gen.max_tokens, 700);
    }

    #[test]
    fn test_unknown_provider_keeps_configured_one() {
        let (args, _dir) = parse(&["--llm-provider", "nope"]);
        assert_eq!(args.to_config().unwrap().llm.provider, LLMProvider::OpenAI);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let args =
            Args::try_parse_from(["investor-storm", "--config", "/definitely/missing.toml"]).unwrap();
        assert!(args.to_config().is_err());
    }

    #[test]
    fn test_command_selection() {
        let (args, _dir) = parse(&["--list"]);
        let config = args.to_config().unwrap();
        assert_eq!(args.command(&config).unwrap(), Command::List);

        let (args, _dir) = parse(&[]);
        assert!(args.command(&config).is_err());

        let (args, _dir) = parse(&["-n", "Acme", "--delete"]);
        assert_eq!(
            args.command(&config).unwrap(),
            Command::Delete {
                name: "Acme".to_string()
            }
        );

        let (args, _dir) = parse(&["-n", "Acme", "--remove-duplicate"]);
        let config = args.to_config().unwrap();
        assert_eq!(
            args.command(&config).unwrap(),
            Command::Generate {
                name: "Acme".to_string(),
                remove_duplicate: true,
                ground_truth_url: None,
            }
        );
    }

    #[test]
    fn test_skip_flags_select_manual_run() {
        let (args, _dir) = parse(&[
            "-n",
            "Acme",
            "--skip-research",
            "--skip-outline",
            "--ground-truth-url",
            "https://example.com/acme",
        ]);
        let config = args.to_config().unwrap();

        assert_eq!(
            args.command(&config).unwrap(),
            Command::Run {
                name: "Acme".to_string(),
                options: RunOptions {
                    do_research: false,
                    do_generate_outline: false,
                    do_generate_article: true,
                    do_polish_article: true,
                    remove_duplicate: false,
                    ground_truth_url: Some("https://example.com/acme".to_string()),
                },
            }
        );
    }
}
