use clap::Parser;
use confbak_cli::{Cli, CliApp, setup_logging};
use tracing::error;

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let cli = Cli::parse();

    // 设置日志记录
    setup_logging(cli.verbose);

    // 加载配置并初始化App
    let mut app = match CliApp::new_with_auto_config(&cli.config).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ 应用初始化失败: {e}");
            std::process::exit(2);
        }
    };

    // 运行命令：0 成功，1 部分成功/警告，2 致命错误
    match app.run_command(cli.command).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("❌ 操作失败: {e}");
            std::process::exit(2);
        }
    }
}
