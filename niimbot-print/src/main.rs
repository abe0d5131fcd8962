use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use clap_num::maybe_hex;
use clap_verbosity::Verbosity;
use image::{
    imageops::invert,
    DynamicImage, GrayImage, ImageFormat, ImageReader, Luma,
};
use niimbot::{Bitmap, FileBackend, MacAddr, Model, Printer, Reduction, SerialBackend};
use std::{
    io::{Cursor, Read},
    path::{Path, PathBuf},
};

#[derive(Clone, Copy, ValueEnum)]
enum Connection {
    /// USB serial port, `--addr` is the port path.
    Usb,
    /// Bluetooth RFCOMM, `--addr` is the MAC address.
    Bluetooth,
    /// Device file, e.g. a bound `/dev/rfcomm0`, `--addr` is the path.
    File,
}

#[derive(Clone, Copy, ValueEnum)]
enum Rotation {
    #[value(name = "0")]
    R0,
    #[value(name = "90")]
    R90,
    #[value(name = "180")]
    R180,
    #[value(name = "270")]
    R270,
}

#[derive(Parser)]
struct Cli {
    /// Path to the image to be printed, `-` reads from stdin.
    file: PathBuf,

    /// Printer model: D11, D110, B1, B18 or B21.
    #[arg(short, long, default_value = "D11")]
    model: Model,

    /// Connection type.
    #[arg(short, long, value_enum, default_value_t = Connection::Usb)]
    conn: Connection,

    /// Bluetooth MAC address or serial device path.
    /// Without it, the first USB serial port is used.
    #[arg(short, long)]
    addr: Option<String>,

    /// Print density, defaults to the highest density of the model.
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=5))]
    density: Option<u8>,

    /// Rotate the image clockwise.
    #[arg(short, long, value_enum, default_value_t = Rotation::R0)]
    rotate: Rotation,

    /// Threshold for dithering.
    #[arg(short = 'T', long, default_value_t = 0x80, value_parser = maybe_hex::<u8>)]
    threshold: u8,

    /// Don't dither, only compare each pixel with the threshold.
    #[arg(long)]
    no_dither: bool,

    /// Invert the printed image.
    #[arg(short, long)]
    invert: bool,

    /// Number of copies.
    #[arg(short, long, default_value_t = 1)]
    num: usize,

    /// Show the image instead of printing.
    #[arg(short, long)]
    show: bool,

    #[command(flatten)]
    verbose: Verbosity,
}

fn rotate(img: GrayImage, rot: Rotation) -> GrayImage {
    match rot {
        Rotation::R0 => img,
        Rotation::R90 => DynamicImage::ImageLuma8(img).rotate90().into_luma8(),
        Rotation::R180 => DynamicImage::ImageLuma8(img).rotate180().into_luma8(),
        Rotation::R270 => DynamicImage::ImageLuma8(img).rotate270().into_luma8(),
    }
}

fn picture(cli: &Cli, data: &[u8]) -> Result<GrayImage> {
    log::trace!("parsing...");
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .decode()
        .context("cannot decode image")?
        .into_luma8();

    log::trace!("rotating...");
    let mut img = rotate(img, cli.rotate);

    if cli.invert {
        log::trace!("inverting...");
        invert(&mut img);
    }

    Ok(img)
}

fn preview(bitmap: &Bitmap<'_>) -> GrayImage {
    GrayImage::from_fn(bitmap.width(), bitmap.height(), |x, y| {
        if bitmap.get(x, y) == Some(true) {
            Luma([0x00])
        } else {
            Luma([0xff])
        }
    })
}

#[cfg(target_os = "linux")]
fn bluetooth(addr: MacAddr) -> Result<Printer> {
    Ok(Printer::new(niimbot::BluetoothBackend::connect(addr)?))
}

#[cfg(not(target_os = "linux"))]
fn bluetooth(_addr: MacAddr) -> Result<Printer> {
    anyhow::bail!("bluetooth connections are only supported on Linux");
}

fn connect(cli: &Cli) -> Result<Printer> {
    match (cli.conn, cli.addr.as_deref()) {
        (Connection::Usb, Some(path)) => Ok(Printer::new(SerialBackend::open(path)?)),
        (Connection::Usb, None) => {
            log::trace!("searching for printer...");
            Printer::find()
        },
        (Connection::Bluetooth, addr) => {
            let addr = addr.context("--addr is required for bluetooth connections")?;
            bluetooth(addr.parse()?)
        },
        (Connection::File, path) => {
            let path = path.context("--addr is required for file connections")?;
            Ok(Printer::new(FileBackend::open(Path::new(path))?))
        },
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::builder()
        .filter_level(cli.verbose.log_level_filter())
        .init();

    let data = if cli.file == Path::new("-") {
        let mut data = Vec::new();
        std::io::stdin().read_to_end(&mut data)?;
        data
    } else {
        std::fs::read(&cli.file)
            .with_context(|| format!("cannot read {}", cli.file.display()))?
    };
    let img = picture(&cli, &data)?;

    let density = cli.density.unwrap_or(cli.model.profile().max_density);
    cli.model
        .validate(density, img.width())
        .context("unsupported image")?;

    log::trace!("reducing...");
    let reduction = if cli.no_dither {
        Reduction::Threshold(cli.threshold)
    } else {
        Reduction::Dither(cli.threshold)
    };
    let bitmap = Bitmap::from_gray(&img, reduction);

    if cli.show {
        let temppath = std::env::temp_dir().join("niimbot-preview.png");
        preview(&bitmap).save_with_format(&temppath, ImageFormat::Png)?;
        open::that(&temppath)?;
        return Ok(());
    }

    log::trace!("encoding...");
    let encoded = bitmap.encode(density)?;

    let mut printer = connect(&cli)?;
    for i in 0..cli.num {
        log::info!("printing copy {}/{}", i + 1, cli.num);
        printer.send_image(&encoded)?;
    }

    Ok(())
}
