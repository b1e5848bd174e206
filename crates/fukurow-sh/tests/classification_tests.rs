use fukurow_sh::*;
use std::io::Cursor;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn reasoner_for(text: &str, config: ReasonerConfig) -> ShReasoner {
    init_tracing();
    let mut reasoner = ShReasoner::new(config);
    FunctionalSyntaxLoader::new()
        .load(Cursor::new(text), &mut reasoner)
        .unwrap();
    reasoner
}

fn classify(text: &str) -> (ShReasoner, Classification) {
    classify_with(text, ReasonerConfig::default())
}

fn classify_with(text: &str, config: ReasonerConfig) -> (ShReasoner, Classification) {
    let mut reasoner = reasoner_for(text, config);
    let classification = reasoner.classify().unwrap();
    (reasoner, classification)
}

fn hierarchy(reasoner: &ShReasoner, classification: &Classification) -> String {
    let terms = reasoner.terms();
    let mut formatter = HierarchyFormatter::new(terms.atomics_ordered());
    classification.feed(terms, &mut formatter).unwrap();
    let mut buffer = Vec::new();
    formatter.write(terms, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Names of the atomic subsumers of `class`; `None` when unsatisfiable
fn subsumers(reasoner: &ShReasoner, classification: &Classification, class: &str) -> Option<Vec<String>> {
    let id = reasoner.terms().find_atomic(class).unwrap();
    let outcome = classification.outcome(id).unwrap();
    outcome
        .satisfiable
        .then(|| outcome.subsumers.iter().map(|&c| reasoner.terms().render(c)).collect())
}

fn configurations() -> Vec<ReasonerConfig> {
    let default = ReasonerConfig::default();
    vec![
        default.clone(),
        ReasonerConfig { subset_elimination: false, ..default.clone() },
        ReasonerConfig { backward_subsumption: true, ..default.clone() },
        ReasonerConfig { top_sharing: true, ..default.clone() },
        ReasonerConfig { fanout_threshold: 1, ..default.clone() },
        ReasonerConfig { secondary_contexts: true, ..default.clone() },
        ReasonerConfig {
            backward_subsumption: true,
            top_sharing: true,
            secondary_contexts: true,
            ..default
        },
    ]
}

const CHAIN: &str = "\
Ontology(
SubClassOf(A B)
SubClassOf(B C)
)
";

const ROLE_HIERARCHY: &str = "\
Ontology(
SubObjectPropertyOf(r s)
SubClassOf(A ObjectSomeValuesFrom(r B))
SubClassOf(owl:Thing ObjectAllValuesFrom(s C))
SubClassOf(ObjectSomeValuesFrom(s C) D)
)
";

#[test]
fn test_subsumption_chain_is_reduced() {
    let (reasoner, classification) = classify(CHAIN);
    assert_eq!(
        subsumers(&reasoner, &classification, "A"),
        Some(vec!["A".to_string(), "B".to_string(), "C".to_string()])
    );
    let output = hierarchy(&reasoner, &classification);
    assert_eq!(output, "Ontology(\nSubClassOf(A B)\nSubClassOf(B C)\n)\n");
    assert!(!output.contains("SubClassOf(A C)"));
}

#[test]
fn test_equivalent_classes_grouped() {
    let (reasoner, classification) = classify("Ontology(\nEquivalentClasses(A B)\n)\n");
    assert_eq!(
        hierarchy(&reasoner, &classification),
        "Ontology(\nEquivalentClasses(A B)\n)\n"
    );
}

#[test]
fn test_self_contradiction_is_unsatisfiable() {
    let (reasoner, classification) = classify("Ontology(\nSubClassOf(A ObjectComplementOf(A))\n)\n");
    assert_eq!(subsumers(&reasoner, &classification, "A"), None);
    assert_eq!(
        hierarchy(&reasoner, &classification),
        "Ontology(\nEquivalentClasses(owl:Nothing A)\n)\n"
    );
}

#[test]
fn test_unsatisfiable_filler_propagates() {
    let text = "\
Ontology(
SubClassOf(A ObjectSomeValuesFrom(r B))
SubClassOf(B ObjectComplementOf(owl:Thing))
)
";
    let (reasoner, classification) = classify(text);
    assert!(classification.consistent);
    assert_eq!(subsumers(&reasoner, &classification, "A"), None);
    assert_eq!(subsumers(&reasoner, &classification, "B"), None);
    assert_eq!(
        hierarchy(&reasoner, &classification),
        "Ontology(\nEquivalentClasses(owl:Nothing A B)\n)\n"
    );
}

#[test]
fn test_role_hierarchy_links_existential_and_universal() {
    let (reasoner, classification) = classify(ROLE_HIERARCHY);
    let a = subsumers(&reasoner, &classification, "A").unwrap();
    assert!(a.contains(&"D".to_string()));
    assert!(!a.contains(&"C".to_string()));
}

#[test]
fn test_existential_cycle_terminates() {
    let text = "\
Ontology(
SubClassOf(A ObjectSomeValuesFrom(r A))
SubClassOf(ObjectSomeValuesFrom(r A) B)
)
";
    let (reasoner, classification) = classify(text);
    assert_eq!(
        subsumers(&reasoner, &classification, "A"),
        Some(vec!["A".to_string(), "B".to_string()])
    );
}

#[test]
fn test_transitive_role() {
    let text = "\
Ontology(
TransitiveObjectProperty(partOf)
SubClassOf(Finger ObjectSomeValuesFrom(partOf Hand))
SubClassOf(Hand ObjectSomeValuesFrom(partOf Arm))
SubClassOf(ObjectSomeValuesFrom(partOf Arm) ArmPart)
)
";
    let (reasoner, classification) = classify(text);
    let finger = subsumers(&reasoner, &classification, "Finger").unwrap();
    assert!(finger.contains(&"ArmPart".to_string()));
    let hand = subsumers(&reasoner, &classification, "Hand").unwrap();
    assert!(hand.contains(&"ArmPart".to_string()));
}

const TRANSITIVE_SUB_ROLE: &str = "\
Ontology(
SubObjectPropertyOf(t r)
TransitiveObjectProperty(t)
SubClassOf(A ObjectSomeValuesFrom(t ObjectSomeValuesFrom(t B)))
SubClassOf(ObjectSomeValuesFrom(r B) C)
)
";

#[test]
fn test_transitive_sub_role_reaches_super_role_existential() {
    for config in configurations() {
        let (reasoner, classification) = classify_with(TRANSITIVE_SUB_ROLE, config.clone());
        let a = subsumers(&reasoner, &classification, "A").unwrap();
        assert!(a.contains(&"C".to_string()), "config {:?}", config);
    }
}

#[test]
fn test_sub_role_chain_needs_transitivity() {
    let text = TRANSITIVE_SUB_ROLE.replace("TransitiveObjectProperty(t)\n", "");
    let (reasoner, classification) = classify(&text);
    assert_eq!(subsumers(&reasoner, &classification, "A"), Some(vec!["A".to_string()]));
}

/// Universal restrictions over a transitive role are not carried along role chains:
/// only existentials are unfolded for transitivity, so the clash two steps away is missed.
#[test]
fn test_universal_over_transitive_role_is_not_chained() {
    let text = "\
Ontology(
TransitiveObjectProperty(r)
SubClassOf(A ObjectSomeValuesFrom(r B))
SubClassOf(B ObjectSomeValuesFrom(r C))
SubClassOf(A ObjectAllValuesFrom(r D))
DisjointClasses(C D)
)
";
    for config in configurations() {
        let (reasoner, classification) = classify_with(text, config.clone());
        assert!(subsumers(&reasoner, &classification, "A").is_some(), "config {:?}", config);
    }
}

#[test]
fn test_disjunction_case_analysis() {
    let text = "\
Ontology(
SubClassOf(A ObjectUnionOf(B C))
SubClassOf(B D)
SubClassOf(C D)
)
";
    let (reasoner, classification) = classify(text);
    let a = subsumers(&reasoner, &classification, "A").unwrap();
    assert!(a.contains(&"D".to_string()));
    assert!(!a.contains(&"B".to_string()));
    assert!(!a.contains(&"C".to_string()));
}

#[test]
fn test_disjoint_classes() {
    let text = "\
Ontology(
DisjointClasses(B C)
SubClassOf(A B)
SubClassOf(A C)
)
";
    let (reasoner, classification) = classify(text);
    assert_eq!(subsumers(&reasoner, &classification, "A"), None);
    assert!(subsumers(&reasoner, &classification, "B").is_some());
}

#[test]
fn test_domain_and_range() {
    let text = "\
Ontology(
ObjectPropertyDomain(hasPet Owner)
ObjectPropertyRange(hasPet Pet)
SubClassOf(ObjectSomeValuesFrom(hasPet Pet) PetLover)
SubClassOf(Person ObjectSomeValuesFrom(hasPet Dog))
)
";
    let (reasoner, classification) = classify(text);
    let person = subsumers(&reasoner, &classification, "Person").unwrap();
    assert!(person.contains(&"Owner".to_string()));
    assert!(person.contains(&"PetLover".to_string()));
    let dog = subsumers(&reasoner, &classification, "Dog").unwrap();
    assert!(!dog.contains(&"Pet".to_string()));
}

#[test]
fn test_inconsistent_ontology() {
    let (reasoner, classification) = classify("Ontology(\nSubClassOf(owl:Thing owl:Nothing)\nSubClassOf(A B)\n)\n");
    assert!(!classification.consistent);
    assert_eq!(
        hierarchy(&reasoner, &classification),
        "Ontology(\nEquivalentClasses(owl:Nothing owl:Thing)\n)\n"
    );
}

#[test]
fn test_class_equivalent_to_thing() {
    for config in configurations() {
        let (reasoner, classification) =
            classify_with("Ontology(\nSubClassOf(owl:Thing A)\nSubClassOf(B C)\n)\n", config);
        assert_eq!(
            hierarchy(&reasoner, &classification),
            "Ontology(\nEquivalentClasses(owl:Thing A)\nSubClassOf(B C)\n)\n"
        );
    }
}

#[test]
fn test_configurations_agree() {
    let ontologies = [
        CHAIN,
        ROLE_HIERARCHY,
        "Ontology(\nSubClassOf(A ObjectIntersectionOf(B C))\nSubClassOf(ObjectIntersectionOf(B C) D)\n)\n",
        "Ontology(\nSubClassOf(A ObjectUnionOf(B C))\nSubClassOf(B D)\nSubClassOf(C D)\nDisjointClasses(C E)\n)\n",
        "Ontology(\nSubClassOf(A ObjectSomeValuesFrom(r B))\nSubClassOf(B ObjectComplementOf(owl:Thing))\n)\n",
        TRANSITIVE_SUB_ROLE,
        "Ontology(\nSubClassOf(A ObjectSomeValuesFrom(r B))\nSubClassOf(A X)\nSubClassOf(X ObjectAllValuesFrom(r C))\n\
         SubClassOf(ObjectSomeValuesFrom(r C) D)\nSubClassOf(B ObjectSomeValuesFrom(r B))\n)\n",
    ];
    for text in ontologies {
        let (reasoner, baseline) = classify(text);
        let expected = hierarchy(&reasoner, &baseline);
        for config in configurations() {
            let (reasoner, classification) = classify_with(text, config.clone());
            assert_eq!(hierarchy(&reasoner, &classification), expected, "config {:?}", config);
        }
    }
}

#[test]
fn test_fanout_reduction_keeps_binary_consequences() {
    let text = "\
Ontology(
SubClassOf(ObjectIntersectionOf(A B) X)
SubClassOf(ObjectIntersectionOf(A C) Y)
SubClassOf(ObjectIntersectionOf(A D) Z)
SubClassOf(Q ObjectIntersectionOf(A B D))
)
";
    let config = ReasonerConfig { fanout_threshold: 1, ..ReasonerConfig::default() };
    let (reasoner, classification) = classify_with(text, config);
    let q = subsumers(&reasoner, &classification, "Q").unwrap();
    assert!(q.contains(&"X".to_string()));
    assert!(q.contains(&"Z".to_string()));
    assert!(!q.contains(&"Y".to_string()));
}

#[test]
fn test_goal_mode() {
    let mut reasoner = reasoner_for(
        "Ontology(\nSubClassOf(ObjectIntersectionOf(A B) C)\n)\n",
        ReasonerConfig::default(),
    );
    let goals = read_goals(Cursor::new("A B\nA\n"), &mut reasoner).unwrap();
    let classification = reasoner.classify_goals(&goals).unwrap();
    let mut buffer = Vec::new();
    write_goal_report(&classification, reasoner.terms(), &mut buffer).unwrap();
    assert_eq!(
        String::from_utf8(buffer).unwrap(),
        "\nA B\n  A\n  B\n  C\n\nA\n  A\n"
    );
}

#[test]
fn test_report_serializes() {
    let (reasoner, classification) = classify(CHAIN);
    let report = classification.report(reasoner.terms());
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["consistent"], true);
    assert_eq!(json["classes"][0]["class"], "A");
    assert_eq!(json["classes"][0]["superclasses"][2], "C");
    assert!(json["stats"]["root_contexts"].as_u64().unwrap() >= 3);
}
