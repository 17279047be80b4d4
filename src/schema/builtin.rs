//! Built-in object types: people, groups and departments.

use serde_json::json;

use crate::models::attribute::{AttributeDef, AttributeKind, ValidationRule, Visibility};
use crate::schema::{SchemaRegistry, SectionDef, TabClass, TypeInfo};

/// Aggregate implementation shared by the built-in types
pub const SIMPLE_TABS: &str = "simpleTabs";

/// Object class marking a branch as a department
pub const DEPARTMENT_CLASS: &str = "gosaDepartment";

fn login_rule() -> ValidationRule {
    ValidationRule::Pattern {
        regex: r"^[a-z0-9._-]+$".into(),
        message: "may only contain lowercase letters, digits, '.', '_' and '-'".into(),
    }
}

fn base_attr() -> AttributeDef {
    AttributeDef::new("base", AttributeKind::Base, "Base")
        .description("Department the object is stored in")
        .required()
}

fn person_tab() -> TabClass {
    TabClass {
        name: "person".into(),
        object_classes: vec![
            "person".into(),
            "organizationalPerson".into(),
            "inetOrgPerson".into(),
        ],
        optional: false,
        sections: vec![
            SectionDef::new(
                "main",
                "Personal information",
                vec![
                    base_attr(),
                    AttributeDef::new("uid", AttributeKind::String, "Login")
                        .description("Login of the user")
                        .required()
                        .unique()
                        .rule(login_rule()),
                    AttributeDef::new("givenName", AttributeKind::String, "First name"),
                    AttributeDef::new("sn", AttributeKind::String, "Last name").required(),
                    AttributeDef::new("cn", AttributeKind::String, "Common name")
                        .description("Full name of the user")
                        .required(),
                    AttributeDef::new("description", AttributeKind::Text, "Description"),
                ],
            ),
            SectionDef::new(
                "credentials",
                "Credentials",
                vec![
                    AttributeDef::new("userPassword", AttributeKind::Password, "Password")
                        .description("Leave empty to keep the current password"),
                ],
            ),
        ],
    }
}

fn posix_tab() -> TabClass {
    TabClass {
        name: "posix".into(),
        object_classes: vec!["posixAccount".into()],
        optional: true,
        sections: vec![SectionDef::new(
            "posix",
            "Unix account",
            vec![
                AttributeDef::new("uidNumber", AttributeKind::Integer, "UID number")
                    .required()
                    .rule(ValidationRule::Range { min: 1000, max: 65535 }),
                AttributeDef::new("gidNumber", AttributeKind::Integer, "GID number")
                    .required()
                    .rule(ValidationRule::Range { min: 1000, max: 65535 }),
                AttributeDef::new("homeDirectory", AttributeKind::String, "Home directory")
                    .required(),
                AttributeDef::new("loginShell", AttributeKind::String, "Shell")
                    .default_value(json!(""))
                    .visibility(Visibility::Set {
                        attribute: "homeDirectory".into(),
                    }),
            ],
        )],
    }
}

fn mail_tab() -> TabClass {
    TabClass {
        name: "mail".into(),
        object_classes: vec!["fdMailAccount".into()],
        optional: true,
        sections: vec![SectionDef::new(
            "mail",
            "Mail account",
            vec![
                AttributeDef::new("mail", AttributeKind::Mail, "Mail address")
                    .required()
                    .unique(),
                AttributeDef::new(
                    "mailAlternateAddress",
                    AttributeKind::StringList,
                    "Alternate addresses",
                ),
            ],
        )],
    }
}

fn group_tab() -> TabClass {
    TabClass {
        name: "group".into(),
        object_classes: vec!["posixGroup".into()],
        optional: false,
        sections: vec![SectionDef::new(
            "main",
            "Group",
            vec![
                base_attr(),
                AttributeDef::new("cn", AttributeKind::String, "Name")
                    .required()
                    .unique()
                    .rule(login_rule()),
                AttributeDef::new("gidNumber", AttributeKind::Integer, "GID number")
                    .required()
                    .unique(),
                AttributeDef::new("description", AttributeKind::Text, "Description"),
                AttributeDef::new("memberUid", AttributeKind::StringList, "Members"),
            ],
        )],
    }
}

fn department_tab() -> TabClass {
    TabClass {
        name: "department".into(),
        object_classes: vec!["organizationalUnit".into(), DEPARTMENT_CLASS.into()],
        optional: false,
        sections: vec![SectionDef::new(
            "main",
            "Department",
            vec![
                base_attr(),
                AttributeDef::new("ou", AttributeKind::String, "Name")
                    .required()
                    .unique(),
                AttributeDef::new("description", AttributeKind::Text, "Description"),
            ],
        )],
    }
}

/// Registry with the built-in types and tab classes.
pub fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register_implementation(SIMPLE_TABS)
        .register_tab_class(person_tab())
        .register_tab_class(posix_tab())
        .register_tab_class(mail_tab())
        .register_tab_class(group_tab())
        .register_tab_class(department_tab())
        .register_type(TypeInfo {
            name: "person".into(),
            description: "User".into(),
            main_attr: "uid".into(),
            ou: "ou=people,".into(),
            filter: "(objectClass=inetOrgPerson)".into(),
            icon: Some("geticon.php?context=types&icon=user".into()),
            tab_group: "persontabs".into(),
            implementation_class: SIMPLE_TABS.into(),
        })
        .register_type(TypeInfo {
            name: "group".into(),
            description: "POSIX group".into(),
            main_attr: "cn".into(),
            ou: "ou=groups,".into(),
            filter: "(objectClass=posixGroup)".into(),
            icon: Some("geticon.php?context=types&icon=user-group".into()),
            tab_group: "grouptabs".into(),
            implementation_class: SIMPLE_TABS.into(),
        })
        .register_type(TypeInfo {
            name: "department".into(),
            description: "Department".into(),
            main_attr: "ou".into(),
            ou: String::new(),
            filter: format!("(objectClass={})", DEPARTMENT_CLASS),
            icon: Some("geticon.php?context=places&icon=folder".into()),
            tab_group: "departmenttabs".into(),
            implementation_class: SIMPLE_TABS.into(),
        });
    registry
}
