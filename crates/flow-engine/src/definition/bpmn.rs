//! BPMN 2.0 XML rendering of process definitions
//!
//! The markup is what gets deployed. Extension metadata is written as
//! `<flowable:key>value</flowable:key>` children of `extensionElements`.

use std::fmt::Write;

use super::model::{ElementKind, FlowElement, ProcessDefinition, SequenceFlow};
use crate::error::Result;
use crate::types::Point;

/// Namespace of the extension attributes and elements
pub const EXTENSION_NAMESPACE: &str = "http://flowable.org/bpmn";
pub const EXTENSION_PREFIX: &str = "flowable";

/// Render a definition as BPMN 2.0 XML with diagram interchange
pub fn to_bpmn_xml(definition: &ProcessDefinition) -> Result<String> {
    let mut xml = String::new();

    writeln!(xml, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        xml,
        r#"<definitions xmlns="http://www.omg.org/spec/BPMN/20100524/MODEL""#
    )?;
    writeln!(
        xml,
        r#"             xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#
    )?;
    writeln!(
        xml,
        r#"             xmlns:{}="{}""#,
        EXTENSION_PREFIX, EXTENSION_NAMESPACE
    )?;
    writeln!(
        xml,
        r#"             xmlns:bpmndi="http://www.omg.org/spec/BPMN/20100524/DI""#
    )?;
    writeln!(
        xml,
        r#"             xmlns:dc="http://www.omg.org/spec/DD/20100524/DC""#
    )?;
    writeln!(
        xml,
        r#"             xmlns:di="http://www.omg.org/spec/DD/20100524/DI""#
    )?;
    writeln!(
        xml,
        r#"             targetNamespace="{}">"#,
        xml_escape(definition.namespace.as_deref().unwrap_or(EXTENSION_NAMESPACE))
    )?;

    writeln!(
        xml,
        r#"  <process id="{}"{} isExecutable="true">"#,
        xml_escape(&definition.id),
        name_attr(definition.name.as_deref())
    )?;
    for element in &definition.elements {
        write_element(&mut xml, element)?;
    }
    for flow in &definition.flows {
        write_flow(&mut xml, flow)?;
    }
    writeln!(xml, "  </process>")?;

    write_diagram(&mut xml, definition)?;
    writeln!(xml, "</definitions>")?;
    Ok(xml)
}

fn write_element(xml: &mut String, element: &FlowElement) -> Result<()> {
    let tag = element.kind.tag();
    let mut attrs = format!(
        r#" id="{}"{}"#,
        xml_escape(&element.id),
        name_attr(element.name.as_deref())
    );
    let mut body = String::new();

    match &element.kind {
        ElementKind::ServiceTask {
            implementation,
            asynchronous,
            exclusive,
        } => {
            if let Some(implementation) = implementation {
                write!(
                    attrs,
                    r#" {}:{}="{}""#,
                    EXTENSION_PREFIX,
                    implementation.kind.as_str(),
                    xml_escape(&implementation.reference)
                )?;
            }
            if *asynchronous {
                write!(attrs, r#" {}:async="true""#, EXTENSION_PREFIX)?;
            }
            if !*exclusive {
                write!(attrs, r#" {}:exclusive="false""#, EXTENSION_PREFIX)?;
            }
        }
        ElementKind::UserTask {
            assignee,
            candidate_groups,
            priority,
        } => {
            if let Some(assignee) = assignee {
                write!(
                    attrs,
                    r#" {}:assignee="{}""#,
                    EXTENSION_PREFIX,
                    xml_escape(assignee)
                )?;
            }
            if !candidate_groups.is_empty() {
                write!(
                    attrs,
                    r#" {}:candidateGroups="{}""#,
                    EXTENSION_PREFIX,
                    xml_escape(&candidate_groups.join(","))
                )?;
            }
            if let Some(priority) = priority {
                write!(attrs, r#" {}:priority="{}""#, EXTENSION_PREFIX, priority)?;
            }
        }
        ElementKind::ScriptTask { format, script } => {
            if let Some(format) = format {
                write!(attrs, r#" scriptFormat="{}""#, xml_escape(format))?;
            }
            if let Some(script) = script {
                writeln!(body, "      <script>{}</script>", xml_escape(script))?;
            }
        }
        _ => {}
    }

    let mut head = String::new();
    if let Some(documentation) = &element.documentation {
        writeln!(
            head,
            "      <documentation>{}</documentation>",
            xml_escape(documentation)
        )?;
    }
    let entries: Vec<_> = element
        .extensions
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .collect();
    if !entries.is_empty() {
        writeln!(head, "      <extensionElements>")?;
        for (key, value) in entries {
            if is_xml_name(key) {
                writeln!(
                    head,
                    "        <{prefix}:{key}>{value}</{prefix}:{key}>",
                    prefix = EXTENSION_PREFIX,
                    key = key,
                    value = xml_escape(value)
                )?;
            } else {
                // Keys that cannot be element names keep their text on an attribute
                writeln!(
                    head,
                    r#"        <{prefix}:field name="{key}">{value}</{prefix}:field>"#,
                    prefix = EXTENSION_PREFIX,
                    key = xml_escape(key),
                    value = xml_escape(value)
                )?;
            }
        }
        writeln!(head, "      </extensionElements>")?;
    }
    head.push_str(&body);

    if head.is_empty() {
        writeln!(xml, "    <{}{} />", tag, attrs)?;
    } else {
        writeln!(xml, "    <{}{}>", tag, attrs)?;
        xml.push_str(&head);
        writeln!(xml, "    </{}>", tag)?;
    }
    Ok(())
}

fn write_flow(xml: &mut String, flow: &SequenceFlow) -> Result<()> {
    let attrs = format!(
        r#" id="{}"{} sourceRef="{}" targetRef="{}""#,
        xml_escape(&flow.id),
        name_attr(flow.name.as_deref()),
        xml_escape(&flow.source),
        xml_escape(&flow.target)
    );
    match &flow.condition {
        Some(condition) => {
            writeln!(xml, "    <sequenceFlow{}>", attrs)?;
            writeln!(
                xml,
                r#"      <conditionExpression xsi:type="tFormalExpression">{}</conditionExpression>"#,
                xml_escape(condition)
            )?;
            writeln!(xml, "    </sequenceFlow>")?;
        }
        None => writeln!(xml, "    <sequenceFlow{} />", attrs)?,
    }
    Ok(())
}

fn write_diagram(xml: &mut String, definition: &ProcessDefinition) -> Result<()> {
    let id = xml_escape(&definition.id);
    writeln!(xml, r#"  <bpmndi:BPMNDiagram id="BPMNDiagram_{}">"#, id)?;
    writeln!(
        xml,
        r#"    <bpmndi:BPMNPlane id="BPMNPlane_{}" bpmnElement="{}">"#,
        id, id
    )?;

    for element in &definition.elements {
        let Some(bounds) = element.bounds else {
            continue;
        };
        let eid = xml_escape(&element.id);
        writeln!(
            xml,
            r#"      <bpmndi:BPMNShape id="BPMNShape_{}" bpmnElement="{}">
        <dc:Bounds x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" />
      </bpmndi:BPMNShape>"#,
            eid,
            eid,
            bounds.upper_left.x,
            bounds.upper_left.y,
            bounds.width(),
            bounds.height()
        )?;
    }

    for flow in &definition.flows {
        let (Some(from), Some(to)) = (center_of(definition, &flow.source), center_of(definition, &flow.target))
        else {
            continue;
        };
        let fid = xml_escape(&flow.id);
        writeln!(
            xml,
            r#"      <bpmndi:BPMNEdge id="BPMNEdge_{}" bpmnElement="{}">
        <di:waypoint x="{:.1}" y="{:.1}" />
        <di:waypoint x="{:.1}" y="{:.1}" />
      </bpmndi:BPMNEdge>"#,
            fid, fid, from.x, from.y, to.x, to.y
        )?;
    }

    writeln!(xml, "    </bpmndi:BPMNPlane>")?;
    writeln!(xml, "  </bpmndi:BPMNDiagram>")?;
    Ok(())
}

fn center_of(definition: &ProcessDefinition, element_id: &str) -> Option<Point> {
    definition.element(element_id)?.bounds.map(|b| b.center())
}

fn name_attr(name: Option<&str>) -> String {
    name.map(|n| format!(r#" name="{}""#, xml_escape(n)))
        .unwrap_or_default()
}

/// ASCII subset of an XML NCName: letter or `_`, then letters, digits, `_`, `-`, `.`
fn is_xml_name(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
