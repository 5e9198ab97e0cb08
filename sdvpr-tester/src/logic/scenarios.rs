use anyhow::{Context, Result, anyhow, ensure};
use std::collections::BTreeSet;
use std::rc::Rc;

use sdvpr_engine::constants::CUSTOM_TEMPLATE_NAME;
use sdvpr_engine::migration::find_migration;
use sdvpr_engine::validate::{check_profile, validate_template_report};
use sdvpr_engine::{
    BuiltinTemplates, MemoryStorage, Profile, RandomizerEngine, SessionOptions, Template,
    deserialize_save_data, serialize_save_data,
};

use super::simulation::{SimulationConfig, SimulationSession, expect_completed};

/// Everything a scenario check needs for one iteration.
#[derive(Debug, Clone)]
pub struct ScenarioInput {
    pub template_name: String,
    pub template: Rc<Template>,
    pub config: SimulationConfig,
}

type ScenarioCheck = fn(&ScenarioInput) -> Result<()>;

#[derive(Debug, Clone, Copy)]
pub struct Scenario {
    pub key: &'static str,
    pub description: &'static str,
    check: ScenarioCheck,
}

impl Scenario {
    /// # Errors
    ///
    /// Returns the reason the iteration failed.
    pub fn run(&self, input: &ScenarioInput) -> Result<()> {
        (self.check)(input)
    }
}

const CATALOG: [Scenario; 6] = [
    Scenario {
        key: "template-validation",
        description: "Bundled template passes structural validation",
        check: template_validation,
    },
    Scenario {
        key: "full-run",
        description: "Seeded playthrough completes every goal",
        check: full_run,
    },
    Scenario {
        key: "save-roundtrip",
        description: "Every intermediate state survives the save codec",
        check: save_roundtrip,
    },
    Scenario {
        key: "migration",
        description: "Legacy progress migrates to its 1.6 template and can finish",
        check: migration,
    },
    Scenario {
        key: "export-import",
        description: "Exported profiles import unchanged into fresh storage",
        check: export_import,
    },
    Scenario {
        key: "undo-redo",
        description: "Undo followed by redo restores the same progress",
        check: undo_redo,
    },
];

#[must_use]
pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    CATALOG
        .iter()
        .map(|scenario| (scenario.key, scenario.description))
        .collect()
}

#[must_use]
pub fn scenario_keys() -> Vec<&'static str> {
    CATALOG.iter().map(|scenario| scenario.key).collect()
}

#[must_use]
pub fn get_scenario(key: &str) -> Option<Scenario> {
    CATALOG.iter().find(|scenario| scenario.key == key).copied()
}

fn template_validation(input: &ScenarioInput) -> Result<()> {
    validate_template_report(&input.template)
        .with_context(|| format!("template '{}' is invalid", input.template_name))
}

fn full_run(input: &ScenarioInput) -> Result<()> {
    let sim = SimulationSession::new(&input.template_name, Rc::clone(&input.template), input.config);
    let (summary, _) = sim.run()?;
    expect_completed(&summary)
}

fn save_roundtrip(input: &ScenarioInput) -> Result<()> {
    let template = Rc::clone(&input.template);
    let sim = SimulationSession::new(&input.template_name, Rc::clone(&template), input.config);
    let (summary, _) = sim.run_with(|session| {
        let data = session.data();
        let encoded = serialize_save_data(data)?;
        let decoded = deserialize_save_data(&encoded)?;
        ensure!(&decoded == data, "decoded save differs: {encoded}");
        check_profile(&decoded, &template).with_context(|| format!("save rejected: {encoded}"))
    })?;
    expect_completed(&summary)
}

fn migration(input: &ScenarioInput) -> Result<()> {
    let Some(migration) = find_migration(&input.template_name) else {
        return Ok(());
    };

    let partial = input.config.with_max_steps(input.template.goals.len());
    let sim = SimulationSession::new(&input.template_name, Rc::clone(&input.template), partial);
    let (_, legacy) = sim.run()?;

    let engine = RandomizerEngine::new(BuiltinTemplates, MemoryStorage::new())
        .with_options(SessionOptions::seeded(input.config.seed));
    engine.profiles().insert_profile(
        Profile {
            name: "Legacy".to_string(),
            template: input.template_name.clone(),
        },
        legacy.data(),
        &input.template,
    )?;

    let migrated = engine.open_session("Legacy")?;
    let target = engine.template(migration.to)?;
    ensure!(
        migrated.data().template_name == migration.to,
        "profile still targets '{}'",
        migrated.data().template_name
    );
    let tracked: BTreeSet<&str> = migrated.data().completion.keys().map(String::as_str).collect();
    let expected: BTreeSet<&str> = target.goals.iter().map(|goal| goal.id.as_str()).collect();
    ensure!(
        tracked == expected,
        "completion does not track exactly the goals of '{}'",
        migration.to
    );

    let reopened = engine.open_session("Legacy")?;
    ensure!(
        reopened.data() == migrated.data(),
        "reopening migrated the profile a second time"
    );

    let (summary, _) = SimulationSession::resume(reopened, input.config).run()?;
    expect_completed(&summary)
}

fn export_import(input: &ScenarioInput) -> Result<()> {
    let source = RandomizerEngine::new(BuiltinTemplates, MemoryStorage::new())
        .with_options(SessionOptions::seeded(input.config.seed));
    let custom = (input.template_name == CUSTOM_TEMPLATE_NAME).then_some(&*input.template);
    source.create_profile("Export", &input.template_name, custom)?;
    let session = source.open_session("Export")?;
    let partial = input.config.with_max_steps(input.template.goals.len() / 2);
    let (_, session) = SimulationSession::resume(session, partial).run()?;
    source.save_session(&session)?;

    let exported = source.export_profile("Export")?;
    let target = RandomizerEngine::new(BuiltinTemplates, MemoryStorage::new());
    let imported = target.import_profile("Imported", &exported.bytes)?;
    ensure!(
        &imported == session.data(),
        "imported progress differs from the exported profile"
    );
    let current = target
        .profiles()
        .current()?
        .ok_or_else(|| anyhow!("import did not select the profile"))?;
    ensure!(current == "Imported", "import selected '{current}'");
    Ok(())
}

fn undo_redo(input: &ScenarioInput) -> Result<()> {
    let mut sim =
        SimulationSession::new(&input.template_name, Rc::clone(&input.template), input.config);
    while sim.step()? {
        let session = sim.session_mut();
        let before = session.snapshot();
        let kind = session
            .undo()
            .ok_or_else(|| anyhow!("nothing to undo after a step"))?;
        ensure!(session.history().can_redo(), "undo of {kind:?} left nothing to redo");
        session
            .redo()
            .ok_or_else(|| anyhow!("redo after undo of {kind:?} did nothing"))?;
        ensure!(
            session.data() == &before,
            "undo and redo of {kind:?} changed progress"
        );
    }
    ensure!(
        sim.session().history().len() <= SessionOptions::default().history_limit,
        "history grew past its limit"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdvpr_engine::TemplateProvider;

    fn input(name: &str, seed: u64) -> ScenarioInput {
        ScenarioInput {
            template_name: name.to_string(),
            template: BuiltinTemplates.get_template(name).unwrap(),
            config: SimulationConfig::new(seed).with_cancel_rate(0.1),
        }
    }

    #[test]
    fn catalog_keys_are_unique() {
        let mut keys = scenario_keys();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), CATALOG.len());
        assert!(get_scenario("full-run").is_some());
        assert!(get_scenario("nope").is_none());
    }

    #[test]
    fn every_scenario_passes_on_shipped_templates() {
        for name in sdvpr_engine::PREDEFINED_TEMPLATES {
            for scenario in CATALOG {
                scenario
                    .run(&input(name, 1337))
                    .unwrap_or_else(|err| panic!("{} on {name}: {err:#}", scenario.key));
            }
        }
    }

    #[test]
    fn migration_is_skipped_for_current_templates() {
        assert!(migration(&input("hardcore_1_6", 3)).is_ok());
    }

    #[test]
    fn custom_template_exports_with_its_definition() {
        let template = Template::from_json(
            r#"{"tags":{},"goals":[
                {"id":"ship_an_item","name":"Ship","multiplicity":3},
                {"id":"build_a_coop","name":"Coop","multiplicity":1,
                 "prerequisites":{"all":[{"goal":"ship_an_item","multiplicity":2}]}}
            ]}"#,
        )
        .unwrap();
        let input = ScenarioInput {
            template_name: CUSTOM_TEMPLATE_NAME.to_string(),
            template: Rc::new(template),
            config: SimulationConfig::new(4),
        };
        export_import(&input).unwrap();
        full_run(&input).unwrap();
    }

    #[test]
    fn invalid_template_fails_validation_scenario() {
        let mut input = input("standard", 1);
        let mut template = (*input.template).clone();
        template.goals[0].multiplicity = 0;
        input.template = Rc::new(template);
        assert!(template_validation(&input).is_err());
    }
}
