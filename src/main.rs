use std::convert::TryFrom;
use std::error::Error;
use std::path::PathBuf;

use ndarray::parallel::prelude::*;
use ndarray::ArrayD;
use tracing::{debug, info, Level};

use field_access::setup::{Configuration, InputError, PrettyDuration};
use field_access::{
    AccessError, FieldAccessor, FieldId, Geometry, PatchDirectory, PatchStore, PatchVariant, Real,
    Selection, StoreDesign, WorkerGroup,
};
#[cfg(feature = "with-mpi")]
use field_access::MpiGroup;
#[cfg(not(feature = "with-mpi"))]
use field_access::SingleProcess;

/// A non-negative count from the `grid` section, if present.
fn count(config: &Configuration, field: &str) -> Result<Option<usize>, InputError> {
    match config.optional("grid", field, Configuration::integer)? {
        Some(n) if n < 0 => Err(InputError::CouldNotParse(field.to_owned(), n.to_string())),
        n => Ok(n.map(|n| n as usize)),
    }
}

/// Two entries of the `grid` section that are only meaningful together.
fn paired<T>(first: (&str, Option<T>), second: (&str, Option<T>)) -> Result<Option<(T, T)>, InputError> {
    match (first, second) {
        ((_, Some(a)), (_, Some(b))) => Ok(Some((a, b))),
        ((_, None), (_, None)) => Ok(None),
        ((a, _), (b, None)) | ((b, None), (a, _)) => {
            Err(InputError::Unpaired("grid".to_owned(), a.to_owned(), b.to_owned()))
        },
    }
}

fn read_design(config: &Configuration) -> Result<StoreDesign, Box<dyn Error>> {
    let geometry = config
        .string("grid", "geometry")?
        .parse::<Geometry>()
        .map_err(|e| InputError::CouldNotParse("geometry".to_owned(), e))?;

    let n_cell = config
        .integers("grid", "n_cell")?
        .into_iter()
        .map(|n| usize::try_from(n).map_err(|_| InputError::CouldNotParse("n_cell".to_owned(), n.to_string())))
        .collect::<Result<Vec<usize>, InputError>>()?;
    let mut design = StoreDesign::new(geometry, n_cell);

    let bounds = paired(
        ("lower", config.optional("grid", "lower", Configuration::reals)?),
        ("upper", config.optional("grid", "upper", Configuration::reals)?),
    )?;
    if let Some((lower, upper)) = bounds {
        design = design.with_bounds(
            lower.iter().map(|&v| v as Real).collect(),
            upper.iter().map(|&v| v as Real).collect(),
        );
    }

    if let Some(n) = count(config, "max_grid_size")? {
        design = design.with_max_grid_size(n);
    }

    if let Some(n) = count(config, "ghost_cells")? {
        design = design.with_ghost_cells(n);
    }

    if let Some(n) = count(config, "ratio")? {
        design = design.with_ratio(n);
    }

    let refinement = paired(
        ("refine_lo", config.optional("grid", "refine_lo", Configuration::integers)?),
        ("refine_hi", config.optional("grid", "refine_hi", Configuration::integers)?),
    )?;
    if let Some((lo, hi)) = refinement {
        design = design.with_refinement(lo, hi);
    }

    let cleaning = config.optional("grid", "pml_cleaning", Configuration::bool)?;
    match count(config, "pml_cells")? {
        Some(n) => design = design.with_pml(n, cleaning.unwrap_or(false)),
        None if cleaning.is_some() => {
            return Err(InputError::Unpaired("grid".to_owned(), "pml_cleaning".to_owned(), "pml_cells".to_owned()).into());
        },
        None => (),
    }

    Ok(design)
}

/// Fills the level-0 fine patch of `name` from its expression in x, y, z.
fn initialize(config: &Configuration, store: &mut PatchStore, name: &str) -> Result<(), Box<dyn Error>> {
    let field = FieldId::parse(name, PatchVariant::Fine)?;
    let f = config.func3("fields", name, ["x", "y", "z"])?;

    let design = store.design().clone();
    let nodal = store.nodal_flag(field)?;
    let slots = design
        .geometry
        .axis_labels()
        .iter()
        .map(|label| design.geometry.axis(label).map(|(_, celldir)| celldir))
        .collect::<Result<Vec<usize>, AccessError>>()?;

    store.fill_with(field, 0, |index, _| {
        let mut r = [0.0; 3];
        for (ax, &slot) in slots.iter().enumerate() {
            r[slot] = design.position(0, ax, index[ax], nodal[ax] == 1) as f64;
        }
        f(r[0], r[1], r[2]) as Real
    })?;

    debug!("initialized {}", field);
    Ok(())
}

fn summarize(data: &ArrayD<Real>) -> (Real, Real, Real) {
    let min = data.par_iter().cloned().reduce(|| Real::INFINITY, Real::min);
    let max = data.par_iter().cloned().reduce(|| Real::NEG_INFINITY, Real::max);
    let mean = data.par_iter().cloned().sum::<Real>() / (data.len().max(1) as Real);
    (min, max, mean)
}

fn main() -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "with-mpi")]
    let universe = mpi::initialize().ok_or("unable to initialize MPI")?;
    #[cfg(feature = "with-mpi")]
    let group = MpiGroup::new(universe.world());
    #[cfg(not(feature = "with-mpi"))]
    let group = SingleProcess;

    let id = group.rank();

    // Prepare configuration file

    let args: Vec<String> = std::env::args().collect();
    let path = args
        .get(1)
        .ok_or(InputError::InvalidInputFile("no file supplied"))?;
    let path = PathBuf::from(path);

    let mut config = Configuration::from_file(&path)?;
    config.with_context("constants");

    let verbose = config.optional("output", "verbose", Configuration::bool)?.unwrap_or(false);
    tracing_subscriber::fmt()
        .with_max_level(if verbose {Level::DEBUG} else {Level::INFO})
        .init();

    // Patch layout and initial conditions

    let design = read_design(&config)?;
    let geometry = design.geometry;
    let levels = design.levels();
    let mut store = PatchStore::new(design, &group)?;

    if id == 0 {
        info!(
            "Running {} geometry, {} level(s), on {} processes with {} threads per process...",
            geometry, levels, group.size(), rayon::current_num_threads()
        );
    }

    let runtime = std::time::Instant::now();

    let names = match config.keys("fields") {
        Ok(names) => names,
        Err(InputError::MissingField(..)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    for name in &names {
        initialize(&config, &mut store, name)?;
    }

    // Read back through the accessors

    let outputs = config.optional("output", "fields", Configuration::strings)?.unwrap_or_default();

    for name in &outputs {
        let field = FieldId::parse(name, PatchVariant::Fine)?;
        let accessor = FieldAccessor::new(&group, &store, field, 0, false)?;
        let data = accessor.read(&store, &Selection::All)?;
        let (min, max, mean) = summarize(&data);

        let mut extent = Vec::new();
        for label in geometry.axis_labels() {
            let mesh = accessor.mesh(&store, label)?;
            let first = mesh.iter().next().cloned().unwrap_or(0.0);
            let last = mesh.iter().last().cloned().unwrap_or(0.0);
            extent.push(format!("{} in [{:.3e}, {:.3e}]", label, first, last));
        }

        if id == 0 {
            info!(
                "{: >4}: shape {:?}, {}; min = {:.6e}, max = {:.6e}, mean = {:.6e}",
                name, data.shape(), extent.join(", "), min, max, mean
            );
        }
    }

    if id == 0 {
        info!("Finished in {}", PrettyDuration::from(runtime.elapsed()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design(grid: &str) -> Result<StoreDesign, Box<dyn Error>> {
        let config = Configuration::from_string(&format!("grid:\n  geometry: 2d\n  n_cell: [8, 8]\n{}", grid))?;
        read_design(&config)
    }

    fn rejected(grid: &str) -> InputError {
        let err = design(grid).err().unwrap();
        err.downcast_ref::<InputError>().cloned().unwrap()
    }

    #[test]
    fn grid_section_is_read() {
        let d = design("  lower: [0.0, -1.0]\n  upper: [4.0, 1.0]\n  max_grid_size: 4\n  refine_lo: [2, 2]\n  refine_hi: [6, 6]\n").unwrap();
        assert_eq!(d.lower, vec![0.0, -1.0]);
        assert_eq!(d.upper, vec![4.0, 1.0]);
        assert_eq!(d.max_grid_size, 4);
        assert_eq!(d.levels(), 2);

        let d = design("").unwrap();
        assert_eq!(d.levels(), 1);
    }

    #[test]
    fn malformed_grid_entries_are_errors() {
        assert!(matches!(rejected("  lower: [0.0, '1.0 +']\n  upper: [4.0, 4.0]\n"), InputError::CouldNotParse(..)));
        assert!(matches!(rejected("  max_grid_size: 4.5\n"), InputError::CouldNotParse(..)));
        assert!(matches!(rejected("  ghost_cells: -1\n"), InputError::CouldNotParse(..)));
        assert!(matches!(rejected("  pml_cells: 4\n  pml_cleaning: maybe\n"), InputError::CouldNotParse(..)));
    }

    #[test]
    fn half_given_pairs_are_errors() {
        let err = rejected("  refine_lo: [2, 2]\n");
        assert!(matches!(&err, InputError::Unpaired(_, a, b) if a == "refine_lo" && b == "refine_hi"));
        let err = rejected("  upper: [4.0, 4.0]\n");
        assert!(matches!(&err, InputError::Unpaired(_, a, b) if a == "upper" && b == "lower"));
        assert!(matches!(rejected("  pml_cleaning: true\n"), InputError::Unpaired(..)));
    }
}
