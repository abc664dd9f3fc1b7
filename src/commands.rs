use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use cluster::{AdmissionOptions, RemovalMode};
use distance::CancelToken;
use genome::PositionSet;
use ingest::VariantPayload;
use store::{SampleId, Store};

/// Initialise an empty store with the reference: contigs from the fasta,
/// globally-ignored positions from the payload's N and gap sets plus any
/// bed exclude intervals.
pub fn add_reference(common: &parser::Common, args: &parser::AddReference) -> Result<()> {
    let sequences = ingest::read_fasta(&args.reference)?;
    info!("{} contigs found in fasta reference.", sequences.len());
    let contigs: Vec<(String, u32)> =
        sequences.iter().map(|(name, seq)| (name.clone(), seq.len() as u32)).collect();
    let contig_names: Vec<String> = contigs.iter().map(|(name, _)| name.clone()).collect();

    let payload = VariantPayload::from_file(&args.input)?;
    for contig in payload.positions.keys() {
        if !contig_names.contains(contig) {
            return Err(store::StoreError::UnknownContig(contig.clone()).into());
        }
    }

    let exclude = match &args.exclude {
        Some(bed) => ingest::exclude_regions_from_bed(bed, &contig_names)?,
        None => BTreeMap::new(),
    };

    // the reference cannot have gaps: a gap in its payload is a region
    // where nothing mapped back, which is an N for our purposes
    let mut ignored: BTreeMap<String, PositionSet> = BTreeMap::new();
    for (contig, sets) in &payload.positions {
        let mut positions = PositionSet::from_unsorted(sets.n.clone())
            .union(&PositionSet::from_unsorted(sets.gap.clone()));
        if let Some(extra) = exclude.get(contig) {
            positions = positions.union(extra);
        }
        ignored.insert(contig.clone(), positions);
    }
    for (contig, extra) in &exclude {
        ignored.entry(contig.clone()).or_insert_with(|| extra.clone());
    }

    let name = match &args.name {
        Some(name) => name.clone(),
        None => default_sample_name(&args.input)?,
    };

    let mut store = Store::create(&common.db)?;
    let mut tx = store.begin();
    let now = tx.now();
    tx.put_reference(&name, &contigs, &ignored, now)?;
    tx.commit()?;
    store.save()?;
    Ok(())
}

/// Add one sample's variants to the store, from a json payload or a
/// whole-genome fasta, after the optional quality gates.
pub fn add_sample(common: &parser::Common, args: &parser::AddSample) -> Result<()> {
    args.check()?;

    let reference_fasta = || {
        args.reference.as_deref().ok_or(parser::ParserError::MissingReferenceFasta)
    };
    let payload = match args.format {
        parser::InputFormat::Json => VariantPayload::from_file(&args.input)?,
        parser::InputFormat::Fasta => {
            let sample = ingest::read_fasta(&args.input)?;
            let reference = ingest::read_fasta(reference_fasta()?)?;
            ingest::payload_from_sequences(&sample, &reference)?
        }
    };

    if let Some(threshold) = args.min_coverage {
        let mean = payload.mean_coverage()?;
        info!("The mean coverage for this sample is: {mean}");
        ingest::check_gate("mean coverage", mean, threshold)?;
    }
    if let Some(threshold) = args.min_nless_n50 {
        let n50 = match args.format {
            parser::InputFormat::Json => payload.nless_n50()?,
            parser::InputFormat::Fasta => {
                let lengths: BTreeMap<String, u32> = ingest::read_fasta(reference_fasta()?)?
                    .into_iter()
                    .map(|(name, seq)| (name, seq.len() as u32))
                    .collect();
                f64::from(ingest::nless_n50(&payload, &lengths))
            }
        };
        info!("The N-less N50 for this sample is: {n50}");
        ingest::check_gate("N-less N50", n50, f64::from(threshold))?;
    }

    let name = match &args.sample_name {
        Some(name) => name.clone(),
        None => default_sample_name(&args.input)?,
    };

    let mut store = Store::open(&common.db)?;
    store.sample_by_name(&args.refname).context("The named reference is not in this store")?;
    let mut tx = store.begin();
    let now = tx.now();
    tx.put_sample(&name, payload.to_variant_sets()?, now)?;
    tx.commit()?;
    store.save()?;
    Ok(())
}

/// Cluster an added sample: distances, proposed address, merges, z-scores,
/// and (on request) registration.
pub fn cluster_sample(common: &parser::Common, args: &parser::ClusterSample) -> Result<()> {
    let mut store = Store::open(&common.db)?;
    let sample = store.sample_by_name(&args.sample_name)?.id;
    info!("Processing sample {} with id {sample}", args.sample_name);

    let opts = AdmissionOptions {
        skip_zscore: args.no_zscore_check,
        force_merge: args.force_merge,
        register   : args.with_registration,
    };
    let token = CancelToken::new();

    let mut tx = store.begin();
    let now = tx.now();
    let spinner = logger::spinner(&format!("clustering {}", args.sample_name));
    let admission = cluster::registrar::admit(&mut tx, sample, opts, &token, now);
    spinner.finish_and_clear();
    let admission = admission?;

    match admission.address {
        Some(address) => {
            tx.commit()?;
            store.save()?;
            println!("{address}");
        }
        None => {
            info!("Store not updated.");
            println!("{}", cluster::registrar::proposed_to_string(&admission.proposed));
        }
    }
    Ok(())
}

pub fn remove_sample(common: &parser::Common, args: &parser::RemoveSample) -> Result<()> {
    let mode = if args.known_outlier {
        RemovalMode::KnownOutlier
    } else if args.just_ignore {
        RemovalMode::Ignore
    } else {
        RemovalMode::HardDelete
    };

    let mut store = Store::open(&common.db)?;
    let sample = store.sample_by_name(&args.sample)?.id;

    let mut tx = store.begin();
    let now = tx.now();
    let spinner = logger::spinner(&format!("removing {}", args.sample));
    let outcome = cluster::remover::remove(&mut tx, sample, mode, now);
    spinner.finish_and_clear();
    let outcome = outcome?;
    tx.commit()?;
    store.save()?;

    for (level, new_clusters) in outcome.splits {
        info!("Removal split {new_clusters} new cluster(s) off at level {level}");
    }
    Ok(())
}

pub fn closest(common: &parser::Common, args: &parser::Closest) -> Result<()> {
    let store = Store::open(&common.db)?;
    let result =
        query::closest(&store, &args.sample_name, args.neighbours, &CancelToken::new())?;
    for (name, distance) in result {
        println!("{name}\t{distance}");
    }
    Ok(())
}

pub fn within(common: &parser::Common, args: &parser::Within) -> Result<()> {
    let store = Store::open(&common.db)?;
    let result = query::within(&store, &args.sample_name, args.distance, &CancelToken::new())?;
    for (name, distance) in result {
        println!("{name}\t{distance}");
    }
    Ok(())
}

pub fn address(common: &parser::Common, args: &parser::SnpAddressArgs) -> Result<()> {
    let store = Store::open(&common.db)?;
    println!("{}", query::snp_address(&store, &args.sample_name)?);
    println!("nearest: {}", query::nearest_band(&store, &args.sample_name)?);
    Ok(())
}

pub fn history(common: &parser::Common, args: &parser::History) -> Result<()> {
    let store = Store::open(&common.db)?;
    let report = query::history(&store, &args.sample_name)?;
    println!("current: {}", report.current);
    for event in report.events {
        println!("{}\t{} -> {}", event.time, event.old, event.new);
    }
    Ok(())
}

pub fn export(common: &parser::Common, args: &parser::Export) -> Result<()> {
    let store = Store::open(&common.db)?;
    let sample: SampleId = store.sample_by_name(&args.sample_name)?.id;
    let payload = ingest::payload_from_store(&store, sample)?;
    match &args.out {
        Some(path) => payload.to_file(path)?,
        None => println!("{}", serde_json::to_string_pretty(&payload)?),
    }
    Ok(())
}

/// The input file name up to its first dot, the conventional sample name.
fn default_sample_name(input: &Path) -> Result<String> {
    let file_name = input
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Cannot derive a sample name from {}", input.display()))?;
    Ok(file_name.split('.').next().unwrap_or(file_name).to_string())
}
