use std::path::PathBuf;
use std::process;

use clap::Parser;

use terrain_amplify::amplify::{self, patches};
use terrain_amplify::dictionary::{self, AmplifyError};
use terrain_amplify::io;

#[derive(Parser, Debug)]
#[command(name = "terrain-amplify")]
#[command(about = "Amplify a heightmap using pre-built example dictionaries")]
struct Args {
    /// Low-resolution input heightmap (grayscale PNG)
    input_heightmap: PathBuf,

    /// Region-label mask selecting a dictionary per area (grayscale PNG)
    input_region_mask: PathBuf,

    /// Output heightmap path (16-bit grayscale PNG)
    output_heightmap: PathBuf,

    /// Amplification factor: 2, 4, or 8
    factor: u32,

    /// One or more dictionary files
    #[arg(required = true)]
    dictionaries: Vec<PathBuf>,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("{}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), AmplifyError> {
    println!("Loading {} dictionaries...", args.dictionaries.len());
    let set = dictionary::load_dictionaries(args.factor, &args.dictionaries)?;
    println!(
        "Dictionary geometry: mask size {}, offset {}",
        set.mask_size, set.offset
    );

    let input = io::read_heightmap(&args.input_heightmap)?;
    println!("Input heightmap: {}x{}", input.columns(), input.rows());

    let labels = io::read_labels(&args.input_region_mask)?;
    let dilated_labels = amplify::dilate_labels(&labels, set.mask_size * 2);
    let (grid_rows, grid_cols) =
        amplify::grid_dims(input.rows(), input.columns(), set.mask_size, set.offset);
    let index_mask = patches::region_index_mask(
        set.mask_size,
        set.offset,
        grid_cols,
        grid_rows,
        &dilated_labels,
        set.dictionaries.len(),
    );

    let factor = args.factor as usize;
    println!("Amplifying {}x...", factor);
    let result = amplify::amplify(
        factor,
        &input,
        &index_mask,
        set.mask_size,
        set.offset,
        &set.dictionaries,
    );

    io::write_heightmap(
        &result.canvas,
        &args.output_heightmap,
        input.columns() * factor,
        input.rows() * factor,
        set.mask_size * factor,
        result.min,
        result.max,
    )?;
    println!("Wrote {}", args.output_heightmap.display());
    Ok(())
}
