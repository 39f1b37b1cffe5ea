//! # 头像裁剪上传工具 — 命令行入口
//!
//! 本文件仅负责日志初始化、参数解析与子命令分发。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use profile_picture::avatar::{AvatarService, CropRegion, EditSession, ImageInput, PixelSize};
use profile_picture::error::AppError;
use profile_picture::settings;

#[derive(Debug, Parser)]
#[command(name = "profile-picture", version, about = "裁剪、编码并上传用户头像")]
struct Cli {
    /// 设置文件路径（JSON）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 覆盖后端根地址
    #[arg(long, global = true)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 裁剪并上传为用户头像
    Upload {
        #[command(flatten)]
        crop: CropArgs,

        /// 用户 id
        #[arg(long)]
        user_id: String,
    },
    /// 裁剪并导出为本地 PNG
    Export {
        #[command(flatten)]
        crop: CropArgs,

        /// 输出文件
        #[arg(short, long)]
        output: PathBuf,
    },
    /// 写出当前生效配置，作为设置文件模板
    InitConfig { path: PathBuf },
}

#[derive(Debug, Args)]
struct CropArgs {
    /// 源图片路径
    image: PathBuf,

    /// 图片显示尺寸，例如 `400x300`；缺省为固有尺寸
    #[arg(long, value_parser = parse_size)]
    display: Option<PixelSize>,

    /// 设备像素比
    #[arg(long, default_value_t = 1.0)]
    pixel_ratio: f64,

    /// 裁剪框（显示像素）：`x,y,w,h`
    #[arg(long, value_parser = parse_px_crop, conflicts_with = "crop_percent")]
    crop: Option<CropRegion>,

    /// 裁剪框（百分比）：`x,y,w,h`
    #[arg(long, value_parser = parse_percent_crop)]
    crop_percent: Option<CropRegion>,

    /// 平滑质量：low / medium / high
    #[arg(long)]
    smoothing: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("❌ {}", err);
            eprintln!("{}", err.user_message());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = settings::load_settings(cli.config.as_deref())?;
    if let Some(url) = cli.backend {
        config.backend_url = url;
        config.validate()?;
    }

    match cli.command {
        Command::InitConfig { path } => {
            settings::save_settings(&path, &config)?;
            log::info!("📝 设置文件已写出 - {}", path.display());
        }
        Command::Export { crop, output } => {
            let service = AvatarService::new(config)?;
            let session = open_session(&service, &crop)?;
            session.export_png(&output)?;
        }
        Command::Upload { crop, user_id } => {
            let service = AvatarService::new(config)?;
            let mut session = open_session(&service, &crop)?;
            let profile = service.upload(&mut session, &user_id).await?;

            let json = serde_json::to_string_pretty(&profile).map_err(std::io::Error::from)?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn open_session(service: &AvatarService, args: &CropArgs) -> Result<EditSession, AppError> {
    if let Some(quality) = &args.smoothing {
        service.set_smoothing(quality)?;
    }

    let input = ImageInput::FilePath(args.image.to_string_lossy().into_owned());
    let mut session = service.open_session(input, args.display, args.pixel_ratio)?;

    if let Some(crop) = args.crop.or(args.crop_percent) {
        if session.set_crop(crop)?.is_none() {
            log::warn!("⚠️ 裁剪框没有面积，无法生成结果");
        }
    }

    Ok(session)
}

fn parse_size(value: &str) -> Result<PixelSize, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("尺寸格式应为 WxH：{}", value))?;
    let width = parse_number(w)?;
    let height = parse_number(h)?;
    let size = PixelSize::new(width, height);
    if !size.is_drawable() {
        return Err(format!("尺寸必须为正数：{}", value));
    }
    Ok(size)
}

fn parse_px_crop(value: &str) -> Result<CropRegion, String> {
    let [x, y, w, h] = parse_quad(value)?;
    Ok(CropRegion::px(x, y, w, h))
}

fn parse_percent_crop(value: &str) -> Result<CropRegion, String> {
    let [x, y, w, h] = parse_quad(value)?;
    Ok(CropRegion::percent(x, y, w, h))
}

fn parse_quad(value: &str) -> Result<[f64; 4], String> {
    let parts = value
        .split(',')
        .map(parse_number)
        .collect::<Result<Vec<_>, _>>()?;
    parts
        .try_into()
        .map_err(|_| format!("裁剪框格式应为 x,y,w,h：{}", value))
}

fn parse_number(value: &str) -> Result<f64, String> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("无效数字：{}", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use profile_picture::avatar::CropUnit;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_upload_arguments() {
        let cli = Cli::try_parse_from([
            "profile-picture",
            "upload",
            "me.png",
            "--user-id",
            "u1",
            "--display",
            "400x300",
            "--pixel-ratio",
            "2",
            "--crop",
            "10,20,100,100",
        ])
        .expect("arguments should parse");

        let Command::Upload { crop, user_id } = cli.command else {
            panic!("expected upload command");
        };
        assert_eq!(user_id, "u1");
        assert_eq!(crop.display, Some(PixelSize::new(400.0, 300.0)));
        assert_eq!(crop.crop, Some(CropRegion::px(10.0, 20.0, 100.0, 100.0)));
        assert_eq!(crop.pixel_ratio, 2.0);
    }

    #[test]
    fn px_and_percent_crops_conflict() {
        let result = Cli::try_parse_from([
            "profile-picture",
            "export",
            "me.png",
            "-o",
            "out.png",
            "--crop",
            "0,0,1,1",
            "--crop-percent",
            "0,0,50,50",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn value_parsers_reject_malformed_input() {
        assert!(parse_size("400").is_err());
        assert!(parse_size("0x10").is_err());
        assert!(parse_px_crop("1,2,3").is_err());
        assert!(parse_px_crop("1,2,three,4").is_err());
        assert_eq!(parse_percent_crop("25, 25, 50, 50").map(|c| c.unit), Ok(CropUnit::Percent));
    }
}
